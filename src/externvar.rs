//! The externally-hosted variable bridge: an opaque handle/get/set/notify vtable.
//!
//! The source expresses this as a 12-function-pointer struct (`tzEXTVARAPI`); the
//! idiomatic Rust shape is a trait object so the default in-process implementation and
//! a dynamically loaded one can sit behind the same `Box<dyn ExternalVariables>`.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};

/// Notification kinds delivered alongside a real-time signal (see [`crate::timers`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NotifyKind {
    Modified = 1,
    Calc = 2,
    Validate = 3,
    Print = 4,
}

impl NotifyKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Modified),
            2 => Some(Self::Calc),
            3 => Some(Self::Validate),
            4 => Some(Self::Print),
            _ => None,
        }
    }
}

/// The 12-function external-variable contract. `handle` is an opaque integer that is
/// stable for the bridge's lifetime once issued by `get_handle`.
pub trait ExternalVariables {
    fn get_handle(&mut self, name: &str) -> u32;

    fn set(&mut self, handle: u32, val: u32);
    fn set_float(&mut self, handle: u32, val: f32);
    fn set_string(&mut self, handle: u32, val: &[u8]);

    fn get(&mut self, handle: u32) -> u32;
    fn get_float(&mut self, handle: u32) -> f32;
    fn get_string(&mut self, handle: u32) -> Vec<u8>;

    /// Returns 0 on success, a nonzero errno-style code on failure.
    fn notify(&mut self, handle: u32, request: u32) -> i32;

    /// Begins validation for notification-request `request`. On success returns the
    /// handle of the variable under validation; `GET` on that handle must then return
    /// the captured proposed value rather than the committed one, until `validate_end`.
    fn validate_start(&mut self, request: u32) -> Option<u32>;

    /// Ends validation. `result` is 0 to allow, nonzero (errno-style) to deny.
    fn validate_end(&mut self, handle: u32, result: i32);

    /// Opens a print session for a PRINT-notification `request`. Returns the variable
    /// handle and a host file descriptor the VM should register as an active write-fd.
    fn open_print_session(&mut self, request: u32) -> Option<(u32, i32)>;

    fn close_print_session(&mut self, handle: u32, fd: i32);
}

#[derive(Debug, Clone)]
enum Value {
    Int(u32),
    Float(f32),
    String(Vec<u8>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

#[derive(Debug, Default)]
struct Record {
    name: String,
    value: Value,
}

/// Default in-process implementation: a name-keyed table with an auto-incrementing
/// handle counter. Notification-related callbacks report "not supported" since there is
/// no signal-delivery collaborator behind this backend.
#[derive(Debug, Default)]
pub struct DefaultExternalVariables {
    records: Vec<Record>,
    by_name: HashMap<String, u32>,
    next_handle: u32,
    /// Handle currently under validation, and its captured proposed value, if any.
    validating: Option<(u32, Value)>,
}

impl DefaultExternalVariables {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            ..Default::default()
        }
    }

    fn record_mut(&mut self, handle: u32) -> Option<&mut Record> {
        self.records.get_mut((handle.checked_sub(1))? as usize)
    }
}

impl ExternalVariables for DefaultExternalVariables {
    fn get_handle(&mut self, name: &str) -> u32 {
        if let Some(&h) = self.by_name.get(name) {
            return h;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.records.push(Record {
            name: name.to_string(),
            value: Value::default(),
        });
        self.by_name.insert(name.to_string(), handle);
        handle
    }

    fn set(&mut self, handle: u32, val: u32) {
        if let Some(r) = self.record_mut(handle) {
            r.value = Value::Int(val);
        }
    }

    fn set_float(&mut self, handle: u32, val: f32) {
        if let Some(r) = self.record_mut(handle) {
            r.value = Value::Float(val);
        }
    }

    fn set_string(&mut self, handle: u32, val: &[u8]) {
        if let Some(r) = self.record_mut(handle) {
            r.value = Value::String(val.to_vec());
        }
    }

    fn get(&mut self, handle: u32) -> u32 {
        if let Some((h, Value::Int(v))) = &self.validating {
            if *h == handle {
                return *v;
            }
        }
        match self.record_mut(handle) {
            Some(Record { value: Value::Int(v), .. }) => *v,
            _ => 0,
        }
    }

    fn get_float(&mut self, handle: u32) -> f32 {
        if let Some((h, Value::Float(v))) = &self.validating {
            if *h == handle {
                return *v;
            }
        }
        match self.record_mut(handle) {
            Some(Record { value: Value::Float(v), .. }) => *v,
            _ => 0.0,
        }
    }

    fn get_string(&mut self, handle: u32) -> Vec<u8> {
        if let Some((h, Value::String(v))) = &self.validating {
            if *h == handle {
                return v.clone();
            }
        }
        match self.record_mut(handle) {
            Some(Record { value: Value::String(v), .. }) => v.clone(),
            _ => Vec::new(),
        }
    }

    fn notify(&mut self, _handle: u32, _request: u32) -> i32 {
        -1
    }

    fn validate_start(&mut self, request: u32) -> Option<u32> {
        let value = self.record_mut(request)?.value.clone();
        self.validating = Some((request, value));
        Some(request)
    }

    fn validate_end(&mut self, handle: u32, result: i32) {
        if result == 0 {
            if let Some((h, v)) = self.validating.take() {
                if h == handle {
                    if let Some(r) = self.record_mut(handle) {
                        r.value = v;
                    }
                }
            }
        } else {
            self.validating = None;
        }
    }

    fn open_print_session(&mut self, _request: u32) -> Option<(u32, i32)> {
        None
    }

    fn close_print_session(&mut self, _handle: u32, _fd: i32) {}
}

/// The collaborator-library vtable shape (`tzEXTVARAPI` in the source): a context
/// pointer plus twelve raw C entry points. `get_handle`/`set*`/`get*` are mandatory;
/// the notification and print-session entries may be null, the same as the source's
/// own `defaultAPI` leaves them unset.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawExternVarApi {
    get_handle: unsafe extern "C" fn(*mut c_void, *mut c_char) -> u32,
    set: unsafe extern "C" fn(*mut c_void, u32, u32),
    set_float: unsafe extern "C" fn(*mut c_void, u32, f32),
    set_string: unsafe extern "C" fn(*mut c_void, u32, *mut c_char),
    get: unsafe extern "C" fn(*mut c_void, u32) -> u32,
    get_float: unsafe extern "C" fn(*mut c_void, u32) -> f32,
    get_string: unsafe extern "C" fn(*mut c_void, u32) -> *mut c_char,
    notify: Option<unsafe extern "C" fn(*mut c_void, u32, u32) -> c_int>,
    validate_start: Option<unsafe extern "C" fn(*mut c_void, u32, *mut u32) -> c_int>,
    validate_end: Option<unsafe extern "C" fn(*mut c_void, u32, c_int) -> c_int>,
    open_print_session: Option<unsafe extern "C" fn(*mut c_void, u32, *mut u32, *mut c_int) -> c_int>,
    close_print_session: Option<unsafe extern "C" fn(*mut c_void, u32, c_int) -> c_int>,
}

type InitFn = unsafe extern "C" fn() -> *mut c_void;
type GetApiFn = unsafe extern "C" fn() -> *const RawExternVarApi;
type ShutdownFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// A collaborator library loaded with `libloading`, exposing `init`/`getapi`/
/// `shutdown` C entry points. `init` hands back an opaque context pointer that is
/// threaded through every call into `getapi`'s vtable, mirroring
/// `CORE_fnInitExternalsLib`'s `dlsym("init")`/`dlsym("getapi")` sequence. The VM only
/// ever touches it through [`ExternalVariables`]; the FFI shape is an implementation
/// detail of this module.
pub struct DynamicExternalVariables {
    library: libloading::Library,
    ctx: *mut c_void,
    api: RawExternVarApi,
}

// The context pointer and vtable are only ever touched through `&mut self`, so access
// is serialized the same way the rest of the VM is single-threaded.
unsafe impl Send for DynamicExternalVariables {}

impl DynamicExternalVariables {
    /// # Safety
    /// Loads and calls into an arbitrary shared library named by the caller, which
    /// must export `init` and `getapi` matching the collaborator-library ABI.
    pub unsafe fn load(path: &str) -> Result<Self, libloading::Error> {
        let library = libloading::Library::new(path)?;
        let init: libloading::Symbol<InitFn> = library.get(b"init\0")?;
        let ctx = init();
        let getapi: libloading::Symbol<GetApiFn> = library.get(b"getapi\0")?;
        let api = *getapi();
        Ok(Self { library, ctx, api })
    }

    fn name_arg(name: &str) -> CString {
        CString::new(name).unwrap_or_default()
    }
}

impl Drop for DynamicExternalVariables {
    fn drop(&mut self) {
        if let Ok(shutdown) = unsafe { self.library.get::<ShutdownFn>(b"shutdown\0") } {
            unsafe { shutdown(self.ctx) };
        }
    }
}

impl ExternalVariables for DynamicExternalVariables {
    fn get_handle(&mut self, name: &str) -> u32 {
        let name = Self::name_arg(name);
        unsafe { (self.api.get_handle)(self.ctx, name.as_ptr() as *mut c_char) }
    }

    fn set(&mut self, handle: u32, val: u32) {
        unsafe { (self.api.set)(self.ctx, handle, val) }
    }

    fn set_float(&mut self, handle: u32, val: f32) {
        unsafe { (self.api.set_float)(self.ctx, handle, val) }
    }

    fn set_string(&mut self, handle: u32, val: &[u8]) {
        let val = CString::new(val).unwrap_or_default();
        unsafe { (self.api.set_string)(self.ctx, handle, val.as_ptr() as *mut c_char) }
    }

    fn get(&mut self, handle: u32) -> u32 {
        unsafe { (self.api.get)(self.ctx, handle) }
    }

    fn get_float(&mut self, handle: u32) -> f32 {
        unsafe { (self.api.get_float)(self.ctx, handle) }
    }

    fn get_string(&mut self, handle: u32) -> Vec<u8> {
        let ptr = unsafe { (self.api.get_string)(self.ctx, handle) };
        if ptr.is_null() {
            Vec::new()
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_bytes().to_vec()
        }
    }

    fn notify(&mut self, handle: u32, request: u32) -> i32 {
        match self.api.notify {
            Some(notify) => unsafe { notify(self.ctx, handle, request) },
            None => -1,
        }
    }

    fn validate_start(&mut self, request: u32) -> Option<u32> {
        let validate_start = self.api.validate_start?;
        let mut h_var: u32 = 0;
        let result = unsafe { validate_start(self.ctx, request, &mut h_var) };
        (result == 0).then_some(h_var)
    }

    fn validate_end(&mut self, handle: u32, result: i32) {
        if let Some(validate_end) = self.api.validate_end {
            unsafe { validate_end(self.ctx, handle, result) };
        }
    }

    fn open_print_session(&mut self, request: u32) -> Option<(u32, i32)> {
        let open_print_session = self.api.open_print_session?;
        let mut h_var: u32 = 0;
        let mut fd: c_int = -1;
        let result = unsafe { open_print_session(self.ctx, request, &mut h_var, &mut fd) };
        (result == 0).then_some((h_var, fd))
    }

    fn close_print_session(&mut self, handle: u32, fd: i32) {
        if let Some(close_print_session) = self.api.close_print_session {
            unsafe { close_print_session(self.ctx, handle, fd as c_int) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_handle_is_stable_and_name_keyed() {
        let mut vars = DefaultExternalVariables::new();
        let a = vars.get_handle("temperature");
        let b = vars.get_handle("pressure");
        let a_again = vars.get_handle("temperature");
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    #[test]
    fn set_and_get_round_trip_each_value_kind() {
        let mut vars = DefaultExternalVariables::new();
        let h = vars.get_handle("v");
        vars.set(h, 7);
        assert_eq!(vars.get(h), 7);
        vars.set_float(h, 1.5);
        assert_eq!(vars.get_float(h), 1.5);
        vars.set_string(h, b"hi");
        assert_eq!(vars.get_string(h), b"hi");
    }

    #[test]
    fn validate_start_captures_the_committed_value_until_end_commits_or_discards() {
        let mut vars = DefaultExternalVariables::new();
        let h = vars.get_handle("v");
        vars.set(h, 10);

        let validating = vars.validate_start(h).unwrap();
        assert_eq!(validating, h);
        // The committed value is unaffected while validation is pending.
        assert_eq!(vars.get(h), 10);

        vars.validate_end(h, 0);
        assert_eq!(vars.get(h), 10);
    }

    #[test]
    fn validate_end_with_a_nonzero_result_discards_the_pending_validation() {
        let mut vars = DefaultExternalVariables::new();
        let h = vars.get_handle("v");
        vars.set(h, 10);
        vars.validate_start(h).unwrap();
        vars.validate_end(h, 1);
        assert_eq!(vars.get(h), 10);
    }

    #[test]
    fn notify_kind_rejects_values_outside_the_known_range() {
        assert_eq!(NotifyKind::from_u32(2), Some(NotifyKind::Calc));
        assert_eq!(NotifyKind::from_u32(0), None);
        assert_eq!(NotifyKind::from_u32(5), None);
    }
}
