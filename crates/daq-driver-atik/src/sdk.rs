//! Safe mirror of the EFW part of the Atik Cameras SDK.
//!
//! [`EfwSdk`] is what the driver talks to. [`LibraryEfwSdk`] resolves the
//! vendor's `Artemis*` exports from the shared library at runtime, so the
//! crate builds on machines without the SDK installed.

#![allow(unsafe_code)]

use crate::error::EfwError;
use crate::status::{check_status, EfwType};
use libloading::Library;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::num::NonZeroUsize;
use std::path::Path;

/// Size of the serial number buffer the SDK fills.
pub const SERIAL_BUFFER_LEN: usize = 100;

/// Opaque device handle returned by `ArtemisEFWConnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EfwHandle(NonZeroUsize);

impl EfwHandle {
    /// Wrap a raw handle value; `None` for a null handle.
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Raw handle value.
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

/// Wheel model and serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfwDetails {
    /// EFW generation
    pub efw_type: EfwType,
    /// Serial number printed on the wheel
    pub serial_number: u32,
}

/// Handle-based EFW calls.
///
/// Every method maps one-to-one onto an `Artemis*` export; non-zero return
/// codes surface as [`EfwError::Status`].
pub trait EfwSdk: Send + Sync {
    /// `ArtemisRefreshDevicesCount`
    fn refresh_devices_count(&self) -> i32;

    /// `ArtemisDeviceCount`
    fn device_count(&self) -> i32;

    /// `ArtemisEFWIsPresent`
    fn is_present(&self, index: i32) -> bool;

    /// `ArtemisEFWConnect`; `None` when the SDK hands back a null handle.
    fn connect(&self, index: i32) -> Option<EfwHandle>;

    /// `ArtemisEFWDisconnect`
    fn disconnect(&self, handle: EfwHandle) -> Result<(), EfwError>;

    /// `ArtemisEFWIsConnected`
    fn is_connected(&self, handle: EfwHandle) -> bool;

    /// `ArtemisEFWGetDetails`
    fn details(&self, handle: EfwHandle) -> Result<EfwDetails, EfwError>;

    /// `ArtemisEFWGetDeviceDetails`
    fn device_details(&self, index: i32) -> Result<EfwDetails, EfwError>;

    /// `ArtemisEFWNmrPosition`
    fn position_count(&self, handle: EfwHandle) -> Result<i32, EfwError>;

    /// `ArtemisEFWSetPosition`
    fn set_position(&self, handle: EfwHandle, position: i32) -> Result<(), EfwError>;

    /// `ArtemisEFWGetPosition`, returning `(position, moving)`.
    fn position(&self, handle: EfwHandle) -> Result<(i32, bool), EfwError>;
}

/// Parse the NUL-terminated serial buffer the SDK fills.
pub fn parse_serial(buffer: &[u8]) -> Result<u32, EfwError> {
    let text = match CStr::from_bytes_until_nul(buffer) {
        Ok(cstr) => cstr.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buffer).into_owned(),
    };
    text.trim()
        .parse()
        .map_err(|_| EfwError::InvalidSerial(text.trim().to_string()))
}

type RefreshDevicesCountFn = unsafe extern "C" fn() -> c_int;
type DeviceCountFn = unsafe extern "C" fn() -> c_int;
type ConnectFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type DisconnectFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type GetDetailsFn = unsafe extern "C" fn(*mut c_void, *mut c_int, *mut c_char) -> c_int;
type GetDeviceDetailsFn = unsafe extern "C" fn(c_int, *mut c_int, *mut c_char) -> c_int;
type IsConnectedFn = unsafe extern "C" fn(*mut c_void) -> bool;
type IsPresentFn = unsafe extern "C" fn(c_int) -> bool;
type NmrPositionFn = unsafe extern "C" fn(*mut c_void, *mut c_int) -> c_int;
type SetPositionFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type GetPositionFn = unsafe extern "C" fn(*mut c_void, *mut c_int, *mut bool) -> c_int;

/// Library names tried when no explicit path is configured.
#[cfg(windows)]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["AtikCameras.dll"];

/// Library names tried when no explicit path is configured.
#[cfg(not(windows))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["/usr/lib/atikcameras.so", "libatikcameras.so"];

/// [`EfwSdk`] backed by the vendor shared library.
///
/// Function pointers are copied out of the library at load time and stay
/// valid for as long as `_lib` is alive.
pub struct LibraryEfwSdk {
    refresh_devices_count: RefreshDevicesCountFn,
    device_count: DeviceCountFn,
    connect: ConnectFn,
    disconnect: DisconnectFn,
    get_details: GetDetailsFn,
    get_device_details: GetDeviceDetailsFn,
    is_connected: IsConnectedFn,
    is_present: IsPresentFn,
    nmr_position: NmrPositionFn,
    set_position: SetPositionFn,
    get_position: GetPositionFn,
    _lib: Library,
}

fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, EfwError> {
    // SAFETY: callers pair each export name with the signature documented in
    // AtikCameras.h.
    unsafe {
        lib.get::<T>(name.as_bytes())
            .map(|sym| *sym)
            .map_err(|_| EfwError::FunctionNotFound(name.to_owned()))
    }
}

impl LibraryEfwSdk {
    /// Load the SDK from `path`, or from the platform default names.
    pub fn load(path: Option<&Path>) -> Result<Self, EfwError> {
        let lib = match path {
            Some(path) => Self::open(&[&*path.to_string_lossy()])?,
            None => Self::open(DEFAULT_LIBRARY_NAMES)?,
        };

        Ok(Self {
            refresh_devices_count: symbol(&lib, "ArtemisRefreshDevicesCount")?,
            device_count: symbol(&lib, "ArtemisDeviceCount")?,
            connect: symbol(&lib, "ArtemisEFWConnect")?,
            disconnect: symbol(&lib, "ArtemisEFWDisconnect")?,
            get_details: symbol(&lib, "ArtemisEFWGetDetails")?,
            get_device_details: symbol(&lib, "ArtemisEFWGetDeviceDetails")?,
            is_connected: symbol(&lib, "ArtemisEFWIsConnected")?,
            is_present: symbol(&lib, "ArtemisEFWIsPresent")?,
            nmr_position: symbol(&lib, "ArtemisEFWNmrPosition")?,
            set_position: symbol(&lib, "ArtemisEFWSetPosition")?,
            get_position: symbol(&lib, "ArtemisEFWGetPosition")?,
            _lib: lib,
        })
    }

    fn open(candidates: &[&str]) -> Result<Library, EfwError> {
        for name in candidates {
            // SAFETY: loading runs the library's initialisers; the Atik SDK has
            // no load-time requirements beyond being on disk.
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    tracing::debug!(library = %name, "Loaded Atik SDK");
                    return Ok(lib);
                }
                Err(e) => tracing::debug!(library = %name, error = %e, "Atik SDK candidate failed"),
            }
        }
        Err(EfwError::LibraryNotFound {
            tried: candidates.join(", "),
        })
    }

    fn ptr(handle: EfwHandle) -> *mut c_void {
        handle.as_raw() as *mut c_void
    }

    fn read_details(
        call: impl FnOnce(*mut c_int, *mut c_char) -> c_int,
        op: &'static str,
    ) -> Result<EfwDetails, EfwError> {
        let mut efw_type: c_int = 0;
        let mut serial = [0u8; SERIAL_BUFFER_LEN];
        let status = call(&mut efw_type as *mut c_int, serial.as_mut_ptr().cast::<c_char>());
        check_status(op, status)?;
        Ok(EfwDetails {
            efw_type: EfwType::try_from(efw_type)?,
            serial_number: parse_serial(&serial)?,
        })
    }
}

impl EfwSdk for LibraryEfwSdk {
    fn refresh_devices_count(&self) -> i32 {
        // SAFETY: no arguments.
        unsafe { (self.refresh_devices_count)() }
    }

    fn device_count(&self) -> i32 {
        // SAFETY: no arguments.
        unsafe { (self.device_count)() }
    }

    fn is_present(&self, index: i32) -> bool {
        // SAFETY: any index is accepted; absent devices report false.
        unsafe { (self.is_present)(index) }
    }

    fn connect(&self, index: i32) -> Option<EfwHandle> {
        // SAFETY: returns null on failure, which from_raw maps to None.
        let raw = unsafe { (self.connect)(index) };
        EfwHandle::from_raw(raw as usize)
    }

    fn disconnect(&self, handle: EfwHandle) -> Result<(), EfwError> {
        // SAFETY: handle came from ArtemisEFWConnect.
        let status = unsafe { (self.disconnect)(Self::ptr(handle)) };
        check_status("ArtemisEFWDisconnect", status)
    }

    fn is_connected(&self, handle: EfwHandle) -> bool {
        // SAFETY: handle came from ArtemisEFWConnect.
        unsafe { (self.is_connected)(Self::ptr(handle)) }
    }

    fn details(&self, handle: EfwHandle) -> Result<EfwDetails, EfwError> {
        Self::read_details(
            // SAFETY: both out-pointers reference live locals; the serial
            // buffer is SERIAL_BUFFER_LEN bytes as the SDK requires.
            |ty, serial| unsafe { (self.get_details)(Self::ptr(handle), ty, serial) },
            "ArtemisEFWGetDetails",
        )
    }

    fn device_details(&self, index: i32) -> Result<EfwDetails, EfwError> {
        Self::read_details(
            // SAFETY: as for `details`.
            |ty, serial| unsafe { (self.get_device_details)(index, ty, serial) },
            "ArtemisEFWGetDeviceDetails",
        )
    }

    fn position_count(&self, handle: EfwHandle) -> Result<i32, EfwError> {
        let mut count: c_int = 0;
        // SAFETY: out-pointer references a live local.
        let status = unsafe { (self.nmr_position)(Self::ptr(handle), &mut count) };
        check_status("ArtemisEFWNmrPosition", status)?;
        Ok(count)
    }

    fn set_position(&self, handle: EfwHandle, position: i32) -> Result<(), EfwError> {
        // SAFETY: handle came from ArtemisEFWConnect.
        let status = unsafe { (self.set_position)(Self::ptr(handle), position) };
        check_status("ArtemisEFWSetPosition", status)
    }

    fn position(&self, handle: EfwHandle) -> Result<(i32, bool), EfwError> {
        let mut position: c_int = 0;
        let mut moving = false;
        // SAFETY: out-pointers reference live locals.
        let status =
            unsafe { (self.get_position)(Self::ptr(handle), &mut position, &mut moving) };
        check_status("ArtemisEFWGetPosition", status)?;
        Ok((position, moving))
    }
}
