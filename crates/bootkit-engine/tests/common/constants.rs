//! Shared test data

pub const PACKAGE_PAYLOAD: &[u8] = b"xar! fake package payload";
pub const TAMPERED_PAYLOAD: &[u8] = b"this is not what was published";

pub const CONSOLE_USER: &str = "tester";
pub const CONSOLE_UID: u32 = 501;

pub const MANIFEST_URL: &str = "https://mdm.example.com/bootstrap.json";

/// A shell script exiting with `code`
pub fn script_body(code: i32) -> String {
    format!("#!/bin/sh\necho \"exiting {}\"\nexit {}\n", code, code)
}
