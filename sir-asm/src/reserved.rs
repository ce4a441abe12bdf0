//! The host-import registry: a closed catalog of reserved modules whose
//! symbols are supplied by the VM rather than by user `extern`
//! declarations. Consulted by the emitter (to synthesize import entries)
//! and by the interpreter (to dispatch `syscall`).

use bitflags::bitflags;

bitflags! {
    /// Flags word of an `imports:` entry.
    pub struct ImportFlags: u32 {
        /// The entry is a synthesized `call$<N>` dynamic companion.
        const DYNAMIC = 0x1;
    }
}

/// One symbol of a reserved module, with its canonical signature expressed
/// in signature type tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReservedSymbol {
    /// Symbol name as emitted.
    pub name: &'static str,
    /// Parameter type tokens.
    pub params: &'static [&'static str],
    /// Return type token.
    pub ret: &'static str,
}

/// A reserved host module and its fixed symbol set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReservedModule {
    /// Canonical lowercase module name, as emitted.
    pub name: &'static str,
    /// The module's complete symbol catalog.
    pub symbols: &'static [ReservedSymbol],
}

/// Process and environment access.
pub const CORE_OS: ReservedModule = ReservedModule {
    name: "core.os",
    symbols: &[
        ReservedSymbol { name: "args_count", params: &[], ret: "i32" },
        ReservedSymbol { name: "args_get", params: &["i32"], ret: "string" },
        ReservedSymbol { name: "env_get", params: &["string"], ret: "string" },
        ReservedSymbol { name: "cwd_get", params: &[], ret: "string" },
        ReservedSymbol { name: "time_mono_ns", params: &[], ret: "i64" },
        ReservedSymbol { name: "time_wall_ns", params: &[], ret: "i64" },
        ReservedSymbol { name: "sleep_ms", params: &["i32"], ret: "void" },
    ],
};

/// Byte-buffer helpers over `list<i32>`.
pub const CORE_IO: ReservedModule = ReservedModule {
    name: "core.io",
    symbols: &[
        ReservedSymbol { name: "buffer_new", params: &["i32"], ret: "list<i32>" },
        ReservedSymbol { name: "buffer_len", params: &["list<i32>"], ret: "i32" },
        ReservedSymbol {
            name: "buffer_fill",
            params: &["list<i32>", "i32", "i32"],
            ret: "i32",
        },
        ReservedSymbol {
            name: "buffer_copy",
            params: &["list<i32>", "list<i32>", "i32"],
            ret: "i32",
        },
    ],
};

/// File descriptors. Errors surface as negative return codes.
pub const CORE_FS: ReservedModule = ReservedModule {
    name: "core.fs",
    symbols: &[
        ReservedSymbol { name: "open", params: &["string", "i32"], ret: "i32" },
        ReservedSymbol { name: "close", params: &["i32"], ret: "void" },
        ReservedSymbol {
            name: "read",
            params: &["i32", "list<i32>", "i32"],
            ret: "i32",
        },
        ReservedSymbol {
            name: "write",
            params: &["i32", "list<i32>", "i32"],
            ret: "i32",
        },
    ],
};

/// Leveled message logging.
pub const CORE_LOG: ReservedModule = ReservedModule {
    name: "core.log",
    symbols: &[ReservedSymbol { name: "log", params: &["string", "i32"], ret: "void" }],
};

/// Dynamic libraries. `call$<N>` companions are synthesized per extern and
/// are not part of the fixed catalog.
pub const CORE_DL: ReservedModule = ReservedModule {
    name: "core.dl",
    symbols: &[
        ReservedSymbol { name: "open", params: &["string"], ret: "i64" },
        ReservedSymbol { name: "sym", params: &["i64", "string"], ret: "i64" },
        ReservedSymbol { name: "close", params: &["i64"], ret: "i32" },
        ReservedSymbol { name: "last_error", params: &[], ret: "string" },
    ],
};

/// Every reserved module, in catalog order.
pub const RESERVED_MODULES: &[ReservedModule] =
    &[CORE_OS, CORE_IO, CORE_FS, CORE_LOG, CORE_DL];

/// Look up a reserved module by its canonical name.
pub fn reserved_module(name: &str) -> Option<&'static ReservedModule> {
    RESERVED_MODULES.iter().find(|module| module.name == name)
}

/// Canonicalize a user-facing import path (`core_os`, `Core.OS`,
/// `Core.Os`, …) to its lowercase reserved-module name. Returns `None`
/// when the path does not name a reserved module.
pub fn canonicalize_import_path(path: &str) -> Option<&'static str> {
    let lowered: String = path
        .chars()
        .map(|c| if c == '_' { '.' } else { c.to_ascii_lowercase() })
        .collect();
    RESERVED_MODULES
        .iter()
        .map(|module| module.name)
        .find(|name| *name == lowered)
}

/// The implicit alias of an unaliased import: the trailing path segment as
/// written (`Core.OS` imports bind the alias `OS`).
pub fn default_import_alias(path: &str) -> &str {
    path.rsplit(['.', '_']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_accepts_every_spelling() {
        for spelling in ["core_os", "Core.OS", "Core.Os", "core.os", "CORE_OS"] {
            assert_eq!(canonicalize_import_path(spelling), Some("core.os"));
        }
        assert_eq!(canonicalize_import_path("Core.FS"), Some("core.fs"));
        assert_eq!(canonicalize_import_path("core.net"), None);
        assert_eq!(canonicalize_import_path("os"), None);
    }

    #[test]
    fn default_alias_is_trailing_segment() {
        assert_eq!(default_import_alias("Core.OS"), "OS");
        assert_eq!(default_import_alias("core_fs"), "fs");
    }

    #[test]
    fn fs_catalog_is_exactly_four_symbols() {
        let fs = reserved_module("core.fs").unwrap();
        let names: Vec<_> = fs.symbols.iter().map(|s| s.name).collect();
        assert_eq!(names, ["open", "close", "read", "write"]);
    }

    #[test]
    fn every_catalog_signature_parses() {
        use crate::SirType;
        for module in RESERVED_MODULES {
            for symbol in module.symbols {
                for param in symbol.params {
                    param.parse::<SirType>().unwrap();
                }
                symbol.ret.parse::<SirType>().unwrap();
            }
        }
    }
}
