//! String marshalling between C and Rust.

use std::ffi::{c_char, CStr, CString};

use crate::{FfiError, Result};

/// Copies a required NUL-terminated UTF-8 argument.
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated string.
pub(crate) unsafe fn required(ptr: *const c_char, name: &'static str) -> Result<String> {
    optional(ptr, name)?.ok_or(FfiError::NullPointer(name))
}

/// Copies an optional NUL-terminated UTF-8 argument; NULL becomes `None`.
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated string.
pub(crate) unsafe fn optional(ptr: *const c_char, name: &'static str) -> Result<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_owned()))
        .map_err(|_| FfiError::InvalidUtf8(name))
}

/// Copies a `const char**` array into owned strings.
///
/// A NULL array is accepted when `count` is zero.
///
/// # Safety
/// `ptr` must point to `count` readable string pointers.
pub(crate) unsafe fn array(
    ptr: *const *const c_char,
    count: usize,
    name: &'static str,
) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(FfiError::NullPointer(name));
    }
    std::slice::from_raw_parts(ptr, count)
        .iter()
        .map(|item| required(*item, name))
        .collect()
}

/// Converts a Rust string for a callback argument.
///
/// Interior NUL bytes cannot cross the boundary and are dropped.
pub(crate) fn to_c(value: &str) -> CString {
    CString::new(value).unwrap_or_else(|_| {
        let cleaned: Vec<u8> = value.bytes().filter(|b| *b != 0).collect();
        CString::new(cleaned).unwrap_or_default()
    })
}

/// Pointer for an optional callback argument, NULL when absent.
pub(crate) fn ptr_or_null(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(std::ptr::null(), |s| s.as_ptr())
}
