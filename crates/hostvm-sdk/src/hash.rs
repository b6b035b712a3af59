//! Identifier hashing
//!
//! Library names and native call identifiers are looked up by their 32-bit
//! FNV-1a hash. Native call identifiers follow the `ClassName_MethodName`
//! convention and are hashed as two independent halves.

use crate::error::HashError;

/// FNV-1a offset basis
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a prime
pub const FNV_PRIME: u32 = 16_777_619;

/// Separator between the class and method halves of a native identifier
pub const CALL_SEPARATOR: char = '_';

/// Hash an identifier with FNV-1a (XOR then multiply, per UTF-8 byte).
///
/// Total over every string; `fnv1a_hash("")` is the offset basis.
#[inline]
pub fn fnv1a_hash(identifier: &str) -> u32 {
    identifier.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hash of a `ClassName_MethodName` native identifier.
///
/// Keeps the literal halves so lookups can confirm a hash match by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifiedCallHash<'a> {
    /// Hash of the text before the first separator
    pub class_hash: u32,
    /// Hash of the text after the first separator
    pub method_hash: u32,
    /// Class half of the identifier
    pub class: &'a str,
    /// Method half of the identifier (may itself contain separators)
    pub method: &'a str,
}

/// Split an identifier at its first `_` and hash both halves.
///
/// # Errors
/// * `HashError::MissingSeparator` - no `_` in the identifier
/// * `HashError::EmptyClass` - the identifier starts with `_`
/// * `HashError::EmptyMethod` - nothing follows the first `_`
pub fn split_and_hash(identifier: &str) -> Result<QualifiedCallHash<'_>, HashError> {
    let (class, method) = identifier
        .split_once(CALL_SEPARATOR)
        .ok_or_else(|| HashError::MissingSeparator(identifier.to_string()))?;

    if class.is_empty() {
        return Err(HashError::EmptyClass(identifier.to_string()));
    }
    if method.is_empty() {
        return Err(HashError::EmptyMethod(identifier.to_string()));
    }

    Ok(QualifiedCallHash {
        class_hash: fnv1a_hash(class),
        method_hash: fnv1a_hash(method),
        class,
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_is_offset_basis() {
        assert_eq!(fnv1a_hash(""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_known_vectors() {
        // Reference values for 32-bit FNV-1a
        assert_eq!(fnv1a_hash("a"), 0xe40c292c);
        assert_eq!(fnv1a_hash("foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_deterministic() {
        for s in ["dart:io", "embed:input", "GamePad", "Logger_PrintString"] {
            assert_eq!(fnv1a_hash(s), fnv1a_hash(s));
        }
        assert_ne!(fnv1a_hash("dart:io"), fnv1a_hash("dart:uri"));
    }

    #[test]
    fn test_split_and_hash() {
        let hash = split_and_hash("GamePad_GetState").unwrap();
        assert_eq!(hash.class, "GamePad");
        assert_eq!(hash.method, "GetState");
        assert_eq!(hash.class_hash, fnv1a_hash("GamePad"));
        assert_eq!(hash.method_hash, fnv1a_hash("GetState"));
    }

    #[test]
    fn test_split_only_at_first_separator() {
        let hash = split_and_hash("File_Read_List").unwrap();
        assert_eq!(hash.class_hash, fnv1a_hash("File"));
        assert_eq!(hash.method_hash, fnv1a_hash("Read_List"));
        assert_eq!(hash.method, "Read_List");
    }

    #[test]
    fn test_split_errors() {
        assert!(matches!(
            split_and_hash("Exit"),
            Err(HashError::MissingSeparator(_))
        ));
        assert!(matches!(
            split_and_hash("_Hidden"),
            Err(HashError::EmptyClass(_))
        ));
        assert!(matches!(
            split_and_hash("GamePad_"),
            Err(HashError::EmptyMethod(_))
        ));
    }
}
