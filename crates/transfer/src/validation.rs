use std::path::{Component, Path};

use crate::TransferError;

/// Validates one half of a transfer identity (client id or file name).
///
/// Each half becomes a single directory entry on the server, and travels
/// as one whitespace-delimited token on the wire.
///
/// Rejects:
/// - Empty values
/// - ASCII whitespace or control characters
/// - Path separators (`/` or `\`)
/// - `.` and `..`
/// - Windows prefix components (`C:`)
pub fn validate_identity_component(value: &str) -> Result<(), TransferError> {
    if value.is_empty() {
        return Err(TransferError::InvalidIdentity("empty value".into()));
    }

    if value
        .chars()
        .any(|c| c.is_ascii_whitespace() || c.is_control())
    {
        return Err(TransferError::InvalidIdentity(format!(
            "whitespace or control character not allowed: {value:?}"
        )));
    }

    if value.contains('/') || value.contains('\\') {
        return Err(TransferError::InvalidIdentity(format!(
            "path separator not allowed: {value}"
        )));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::CurDir | Component::ParentDir), _) => {
            return Err(TransferError::InvalidIdentity(format!(
                "relative directory not allowed: {value}"
            )));
        }
        (Some(Component::Prefix(_) | Component::RootDir), _) => {
            return Err(TransferError::InvalidIdentity(format!(
                "path prefix not allowed: {value}"
            )));
        }
        _ => {
            return Err(TransferError::InvalidIdentity(format!(
                "must be a single path component: {value}"
            )));
        }
    }

    Ok(())
}
