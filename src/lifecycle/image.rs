//! Compiled module images.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A type exported by a module image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Namespace, empty for the global namespace.
    pub namespace: String,
    /// Simple name.
    pub name: String,
}

impl TypeInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// `namespace.Name`, or just `Name` in the global namespace.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Self-contained binary unit produced by the compiler.
#[derive(Clone, PartialEq, Eq)]
pub struct ModuleImage {
    code: Vec<u8>,
    types: Vec<TypeInfo>,
}

impl ModuleImage {
    pub fn new(code: Vec<u8>, types: Vec<TypeInfo>) -> Self {
        Self { code, types }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Hex SHA-256 of the code bytes.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.code))
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<TypeInfo>) {
        (self.code, self.types)
    }
}

impl fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleImage")
            .field("code_len", &self.code.len())
            .field("types", &self.types.len())
            .finish()
    }
}

/// Debug symbols emitted alongside a debug build.
#[derive(Clone, PartialEq, Eq)]
pub struct DebugSymbols(pub Vec<u8>);

impl fmt::Debug for DebugSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DebugSymbols({} bytes)", self.0.len())
    }
}
