//! Parameter list parsing
//!
//! A parameter list is a comma-separated sequence of `[raw] <type> <name>`
//! entries. A one-character type is a generic tag shared by every parameter
//! that names it; longer types must be canonical dtype names.

use crate::dtype::DType;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

/// Type keyword of the iteration indexer slot
pub const INDEXER_KEYWORD: &str = "CIndexer";

/// Name prefix given to the array behind a non-raw parameter
pub(crate) const RAW_PREFIX: &str = "_raw_";

/// Name of the implicit trailing indexer parameter
pub(crate) const INDEXER_NAME: &str = "_ind";

/// What a declared parameter's type refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Generic tag resolved per call (e.g. `T`)
    Generic(char),
    /// A fixed element type
    Concrete(DType),
    /// The iteration indexer slot
    Indexer,
}

/// One parsed parameter
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    /// Identifier used in the kernel body
    pub name: String,
    /// Declared type
    pub kind: ParamKind,
    /// Excluded from broadcasting and per-element dereferencing
    pub raw: bool,
    /// Emitted with a `const` qualifier (inputs)
    pub is_const: bool,
}

impl ParamInfo {
    /// The implicit indexer parameter appended to every kernel
    pub(crate) fn indexer() -> Self {
        Self {
            name: INDEXER_NAME.to_string(),
            kind: ParamKind::Indexer,
            raw: false,
            is_const: false,
        }
    }

    /// Generic tag, if the type is generic
    pub fn tag(&self) -> Option<char> {
        match self.kind {
            ParamKind::Generic(c) => Some(c),
            _ => None,
        }
    }

    /// Concrete dtype, if the type is fixed
    pub fn dtype(&self) -> Option<DType> {
        match self.kind {
            ParamKind::Concrete(dt) => Some(dt),
            _ => None,
        }
    }

    fn parse(entry: &str, is_const: bool) -> Result<Self> {
        let tokens: Vec<&str> = entry.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(Error::syntax(entry, "expected '[raw] <type> <name>'"));
        }

        let (modifiers, decl) = tokens.split_at(tokens.len() - 2);
        let (ty, name) = (decl[0], decl[1]);

        let kind = if ty == INDEXER_KEYWORD {
            ParamKind::Indexer
        } else if ty.chars().count() == 1 {
            let c = ty.chars().next().unwrap_or_default();
            if !(c.is_ascii_alphabetic() || c == '_') {
                return Err(Error::syntax(entry, format!("invalid type tag '{ty}'")));
            }
            ParamKind::Generic(c)
        } else {
            let dtype = DType::from_name(ty)
                .ok_or_else(|| Error::syntax(entry, format!("wrong type name '{ty}'")))?;
            ParamKind::Concrete(dtype)
        };

        let mut raw = false;
        for &m in modifiers {
            match m {
                "raw" => raw = true,
                _ => return Err(Error::syntax(entry, format!("unknown modifier '{m}'"))),
            }
        }

        if !is_identifier(name) {
            return Err(Error::syntax(entry, format!("'{name}' is not a valid identifier")));
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            raw,
            is_const,
        })
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

type ParamMemo = Mutex<HashMap<(String, bool), Arc<[ParamInfo]>>>;

/// Parse a parameter list
///
/// Results are memoized process-wide by `(text, is_const)`, so parsing the
/// same text twice returns the same shared list. Empty or whitespace-only
/// text yields an empty list.
///
/// # Errors
///
/// `Error::Syntax` for entries with fewer than two tokens, unknown modifiers,
/// non-canonical type names, or invalid identifiers.
pub fn parse_params(text: &str, is_const: bool) -> Result<Arc<[ParamInfo]>> {
    static MEMO: OnceLock<ParamMemo> = OnceLock::new();
    let memo = MEMO.get_or_init(|| Mutex::new(HashMap::new()));

    let key = (text.to_string(), is_const);
    if let Some(params) = memo.lock().get(&key) {
        return Ok(params.clone());
    }

    let params: Arc<[ParamInfo]> = if text.trim().is_empty() {
        Arc::from(Vec::new())
    } else {
        text.split(',')
            .map(|entry| ParamInfo::parse(entry, is_const))
            .collect::<Result<Vec<_>>>()?
            .into()
    };

    Ok(memo.lock().entry(key).or_insert(params).clone())
}

/// Check user-declared parameter names before any code is generated
///
/// Rejects `i` (the loop variable), duplicates, names that collide with
/// generated identifiers or generic tags, and explicit indexer slots.
pub(crate) fn validate_params(op: &str, params: &[ParamInfo]) -> Result<()> {
    let tags: HashSet<char> = params.iter().filter_map(ParamInfo::tag).collect();
    let mut seen = HashSet::new();

    for p in params {
        let reason = if p.name == "i" {
            Some("cannot use 'i' as a parameter name".to_string())
        } else if p.kind == ParamKind::Indexer {
            Some(format!(
                "'{}': the {INDEXER_KEYWORD} argument is supplied implicitly",
                p.name
            ))
        } else if p.name.starts_with(RAW_PREFIX) || p.name.starts_with(INDEXER_NAME) {
            Some(format!("'{}' uses a reserved prefix", p.name))
        } else if p.name.chars().count() == 1 && p.name.chars().all(|c| tags.contains(&c)) {
            Some(format!("'{}' collides with a type tag", p.name))
        } else if !seen.insert(p.name.as_str()) {
            Some(format!("duplicate parameter name '{}'", p.name))
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(Error::value_error(op, reason));
        }
    }
    Ok(())
}
