//! JavaScript identifier helpers shared by analysis, transforms and codegen

use rustc_hash::FxHashSet;
use serde_json::Value;

const RESERVED_WORDS: &[&str] = &[
    "arguments",
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "eval",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Whether `name` is an IdentifierName (usable after a `.` in a member access)
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Whether `name` can be declared as a binding
pub fn is_valid_identifier(name: &str) -> bool {
    is_identifier_name(name) && !is_reserved_word(name)
}

/// JavaScript string literal for `value`
pub fn js_string(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// `object.name`, or `object["name"]` when `name` is not an identifier name
pub fn property_access(object: &str, name: &str) -> String {
    if is_identifier_name(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", js_string(name))
    }
}

/// Object literal key for `name`; `__proto__` is computed so it stays an own property
pub fn property_key(name: &str) -> String {
    if name == "__proto__" {
        format!("[{}]", js_string(name))
    } else if is_identifier_name(name) {
        name.to_owned()
    } else {
        js_string(name)
    }
}

/// Replace characters that cannot appear in an identifier with `_`
pub fn sanitize_identifier(raw: &str) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Global variable name an external is read from when none is configured
///
/// `pdf-lib` becomes `pdfLib`, `@scope/pkg` becomes `scopePkg`.
pub fn default_global_name(external: &str) -> String {
    let mut name = String::new();
    for (i, part) in external
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .filter(|part| !part.is_empty())
        .enumerate()
    {
        if i == 0 {
            name.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                name.extend(first.to_uppercase());
                name.push_str(chars.as_str());
            }
        }
    }
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Hands out identifiers that collide neither with each other nor with
/// anything written in the source they are injected into
#[derive(Debug)]
pub struct NameAllocator<'s> {
    source: &'s str,
    used: FxHashSet<String>,
}

impl<'s> NameAllocator<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            used: FxHashSet::default(),
        }
    }

    /// Mark a name as taken without allocating it
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_owned());
    }

    pub fn fresh(&mut self, base: &str) -> String {
        let base = sanitize_identifier(base);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.is_taken(&candidate) {
            candidate = format!("{base}${counter}");
            counter += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }

    fn is_taken(&self, candidate: &str) -> bool {
        is_reserved_word(candidate)
            || self.used.contains(candidate)
            || self.source.contains(candidate)
    }
}
