//! Canonical language tags and per-language executor facts.
//!
//! Dispatch is keyed by a single closed enum: each tag knows its executor
//! binary name, its argv shape, and whether a transpiler slot exists for it.

use std::fmt;

use serde::{Serialize, Serializer};

/// A supported service language, canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Javascript,
    Babel,
    CoffeeScript,
    Bash,
    Lua,
    Perl,
    Php,
    Python,
    Python3,
    Ruby,
    Scheme,
    Smalltalk,
    Tcl,
}

impl Language {
    /// Every supported language, in tag order.
    pub const ALL: [Language; 13] = [
        Language::Javascript,
        Language::Babel,
        Language::CoffeeScript,
        Language::Bash,
        Language::Lua,
        Language::Perl,
        Language::Php,
        Language::Python,
        Language::Python3,
        Language::Ruby,
        Language::Scheme,
        Language::Smalltalk,
        Language::Tcl,
    ];

    /// Resolve a raw language tag to its canonical form.
    ///
    /// An empty tag defaults to `javascript`. Accepted aliases: `coffee` for
    /// `coffee-script`, `es6` and `es7` for `babel`. Anything else is a
    /// configuration error and returns `None`.
    pub fn canonical(tag: &str) -> Option<Language> {
        match tag {
            "" | "javascript" => Some(Language::Javascript),
            "babel" | "es6" | "es7" => Some(Language::Babel),
            "coffee-script" | "coffee" => Some(Language::CoffeeScript),
            "bash" => Some(Language::Bash),
            "lua" => Some(Language::Lua),
            "perl" => Some(Language::Perl),
            "php" => Some(Language::Php),
            "python" => Some(Language::Python),
            "python3" => Some(Language::Python3),
            "ruby" => Some(Language::Ruby),
            "scheme" => Some(Language::Scheme),
            "smalltalk" => Some(Language::Smalltalk),
            "tcl" => Some(Language::Tcl),
            _ => None,
        }
    }

    /// The canonical tag string.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Babel => "babel",
            Language::CoffeeScript => "coffee-script",
            Language::Bash => "bash",
            Language::Lua => "lua",
            Language::Perl => "perl",
            Language::Php => "php",
            Language::Python => "python",
            Language::Python3 => "python3",
            Language::Ruby => "ruby",
            Language::Scheme => "scheme",
            Language::Smalltalk => "smalltalk",
            Language::Tcl => "tcl",
        }
    }

    /// Name of the executor binary under the binaries root.
    ///
    /// The node family (`javascript`, `babel`, `coffee-script`) shares the
    /// `javascript` executor; every other language runs its own.
    pub fn binary_name(self) -> &'static str {
        match self {
            Language::Javascript | Language::Babel | Language::CoffeeScript => "javascript",
            other => other.as_str(),
        }
    }

    /// Whether the executor takes the full default argv shape
    /// (`-c code -e env -s service`).
    ///
    /// The six languages with dedicated argument generators take the reduced
    /// shape without the serialized service.
    pub fn uses_default_argv(self) -> bool {
        !matches!(
            self,
            Language::Bash
                | Language::Lua
                | Language::Perl
                | Language::Scheme
                | Language::Smalltalk
                | Language::Tcl
        )
    }

    /// Whether a transpiler slot exists for this language.
    pub fn transpiles(self) -> bool {
        matches!(self, Language::Babel | Language::CoffeeScript)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
