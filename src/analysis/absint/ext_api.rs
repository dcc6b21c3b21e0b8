//! The extern-API model: per-function annotations describing the memory
//! behavior of library functions, plus the small table of pure functions
//! the engine evaluates directly.
//!
//! Annotations come from two places: the consumed per-function table on
//! [`FunInfo`], and a JSON artifact mapping function names to annotation
//! lists. An embedded default artifact covers the common libc surface; a
//! configured path replaces it, and failing to read that path is a fatal
//! configuration error.

use rustc_hash::FxHashMap;

use crate::ir::FunInfo;

use super::AeError;

const DEFAULT_MODEL: &str = include_str!("extapi.json");

/// Memory-semantics categories the engine gives dedicated transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtApiKind {
    Memcpy,
    Memset,
    Strcpy,
    Strcat,
    Unclassified,
}

#[derive(Debug)]
pub struct ExtApi {
    annotations: FxHashMap<String, Vec<String>>,
}

impl ExtApi {
    /// Load the model artifact. An empty path selects the embedded model.
    pub fn load(path: &str) -> Result<Self, AeError> {
        let text = if path.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            std::fs::read_to_string(path)
                .map_err(|_| AeError::ExtApiNotFound { path: path.to_string() })?
        };
        let annotations: FxHashMap<String, Vec<String>> = serde_json::from_str(&text)
            .map_err(|_| AeError::ExtApiNotFound { path: path.to_string() })?;
        Ok(ExtApi { annotations })
    }

    /// Every annotation attached to `fun`: the consumed table first, then
    /// the artifact entry for its name.
    pub fn annotations_of(&self, fun: &FunInfo) -> Vec<String> {
        let mut out = fun.annotations.clone();
        if let Some(more) = self.annotations.get(&fun.name) {
            out.extend(more.iter().cloned());
        }
        out
    }

    pub fn has_annotation(&self, fun: &FunInfo, tag: &str) -> bool {
        self.annotations_of(fun).iter().any(|a| a.contains(tag))
    }

    fn annotation(&self, fun: &FunInfo, tag: &str) -> Option<String> {
        self.annotations_of(fun).into_iter().find(|a| a.contains(tag))
    }

    pub fn classify(&self, fun: &FunInfo) -> ExtApiKind {
        let mut kind = ExtApiKind::Unclassified;
        for annotation in self.annotations_of(fun) {
            if annotation.contains("MEMCPY") {
                kind = ExtApiKind::Memcpy;
            }
            if annotation.contains("MEMSET") {
                kind = ExtApiKind::Memset;
            }
            if annotation.contains("STRCPY") {
                kind = ExtApiKind::Strcpy;
            }
            if annotation.contains("STRCAT") {
                kind = ExtApiKind::Strcat;
            }
        }
        kind
    }

    /// Does `fun` copy memory in any form?
    pub fn is_memcpy(&self, fun: &FunInfo) -> bool {
        self.has_annotation(fun, "MEMCPY")
            || self.has_annotation(fun, "STRCPY")
            || self.has_annotation(fun, "STRCAT")
    }

    pub fn is_memset(&self, fun: &FunInfo) -> bool {
        self.has_annotation(fun, "MEMSET")
    }

    /// Does `fun` return a freshly allocated object?
    pub fn is_alloc(&self, fun: &FunInfo) -> bool {
        self.has_annotation(fun, "ALLOC_RET")
    }

    /// Does `fun` allocate a new object and assign it to one of its
    /// arguments?
    pub fn is_arg_alloc(&self, fun: &FunInfo) -> bool {
        self.has_annotation(fun, "ALLOC_ARG")
    }

    /// Position of the argument receiving the allocation.
    pub fn alloc_arg_pos(&self, fun: &FunInfo) -> Option<u32> {
        let annotation = self.annotation(fun, "ALLOC_ARG")?;
        let digits: String = annotation.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn is_realloc(&self, fun: &FunInfo) -> bool {
        self.has_annotation(fun, "REALLOC_RET")
    }

    /// Should `fun` be treated as external? Declarations always are; a
    /// defined function is external when annotated, unless its sole
    /// annotation is `OVERWRITE` (a user-defined replacement of a known
    /// external).
    pub fn is_ext(&self, fun: &FunInfo) -> bool {
        if fun.is_decl {
            return true;
        }
        let annotations = self.annotations_of(fun);
        if annotations.iter().any(|a| a.contains("OVERWRITE")) && annotations.len() == 1 {
            return false;
        }
        !annotations.is_empty()
    }
}

const CLASSIFIERS: &[&str] = &[
    "isalnum", "isalpha", "isblank", "iscntrl", "isdigit", "isgraph", "isprint", "ispunct",
    "isspace", "isupper", "isxdigit",
];

const MATH_FUNS: &[&str] = &["sin", "cos", "tan", "log", "sinh", "cosh", "tanh"];

/// Is `name` in the table of modelled pure functions?
pub(crate) fn is_modelled_name(name: &str) -> bool {
    name == "svf_assert"
        || name == "svf_print"
        || CLASSIFIERS.contains(&name)
        || MATH_FUNS.contains(&name)
}

/// Evaluate a character classifier on a concrete argument.
pub(crate) fn classifier_value(name: &str, c: i64) -> Option<i64> {
    let ch = (c as u8) as char;
    let v = match name {
        "isalnum" => ch.is_ascii_alphanumeric(),
        "isalpha" => ch.is_ascii_alphabetic(),
        "isblank" => ch == ' ' || ch == '\t',
        "iscntrl" => ch.is_ascii_control(),
        "isdigit" => ch.is_ascii_digit(),
        "isgraph" => ch.is_ascii_graphic(),
        "isprint" => ch.is_ascii_graphic() || ch == ' ',
        "ispunct" => ch.is_ascii_punctuation(),
        "isspace" => ch.is_ascii_whitespace(),
        "isupper" => ch.is_ascii_uppercase(),
        "isxdigit" => ch.is_ascii_hexdigit(),
        _ => return None,
    };
    Some(v as i64)
}

/// Evaluate a modelled math function on a concrete argument, truncating
/// the result to an integer as the interpreted programs do.
pub(crate) fn math_value(name: &str, x: i64) -> Option<i64> {
    let x = x as f64;
    let v = match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "log" => x.ln(),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        _ => return None,
    };
    Some(v as i64)
}
