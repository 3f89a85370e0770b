pub mod cstyle;
pub mod hlsl;
pub mod msl;
pub mod spirv;

use crate::{
    ast::Ast,
    binding::ManifestEntry,
    name_resolution::SymbolTable,
    type_resolution::TypeResolution,
    types::TypeTable,
};
use lasso::Spur;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;

/// One supported output dialect. Generators are independent: they share no
/// state and a failure in one never blocks the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Hlsl,
    Msl,
    Spirv,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Hlsl, Target::Msl, Target::Spirv];

    pub fn name(&self) -> &'static str {
        match self {
            Target::Hlsl => "hlsl",
            Target::Msl => "msl",
            Target::Spirv => "spirv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Target::Hlsl => "hlsl",
            Target::Msl => "metal",
            Target::Spirv => "spv",
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedCode {
    Text(String),
    Words(Vec<u32>),
}

/// Everything one target produces for one compile unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutput {
    pub code: GeneratedCode,
    pub manifest: Vec<ManifestEntry>,
}

/// Read-only view of the validated compile unit shared by every generator.
#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    pub ast: &'a Ast,
    pub symbols: &'a SymbolTable,
    pub types: &'a TypeTable,
    pub resolution: &'a TypeResolution,
}

impl<'a> Context<'a> {
    pub fn resolve(&self, spur: Spur) -> &'a str {
        self.ast.rodeo.resolve(&spur)
    }
}

/// Renames identifiers that collide with target reserved words. The suffix
/// scheme is deterministic: first collision gets `_0`, the next `_1`, and a
/// given identifier always maps to the same output name.
pub(crate) struct Mangler {
    reserved: HashSet<&'static str>,
    used: HashSet<String>,
    renames: HashMap<Spur, String>,
}

impl Mangler {
    pub fn new(reserved: &'static [&'static str]) -> Self {
        Mangler {
            reserved: reserved.iter().copied().collect(),
            used: HashSet::new(),
            renames: HashMap::new(),
        }
    }

    /// A unique name with no source identifier behind it, for synthesized
    /// declarations.
    pub fn fresh(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 0u32;
        while self.reserved.contains(candidate.as_str()) || self.used.contains(&candidate) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }

    pub fn get(&mut self, name: &str, spur: Spur) -> String {
        if let Some(renamed) = self.renames.get(&spur) {
            return renamed.clone();
        }

        let mut candidate = name.to_string();
        if self.reserved.contains(candidate.as_str()) || self.used.contains(&candidate) {
            let mut counter = 0u32;
            loop {
                candidate = format!("{}_{}", name, counter);
                if !self.reserved.contains(candidate.as_str()) && !self.used.contains(&candidate)
                {
                    break;
                }
                counter += 1;
            }
        }

        self.used.insert(candidate.clone());
        self.renames.insert(spur, candidate.clone());
        candidate
    }
}

/// Indented line writer used by the text backends.
pub(crate) struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            out: String::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent -= 1;
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Literal formatting is shared by both text targets so identical input
/// yields byte-identical output.
pub(crate) fn float_lit(f: f32) -> String {
    if f == f.trunc() && f.is_finite() && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangler_renames_reserved_words_deterministically() {
        let mut rodeo = lasso::Rodeo::default();
        let sampler = rodeo.get_or_intern("sampler");
        let other = rodeo.get_or_intern("other");
        let mut mangler = Mangler::new(&["sampler"]);
        assert_eq!(mangler.get("sampler", sampler), "sampler_0");
        // Cached on repeat lookups.
        assert_eq!(mangler.get("sampler", sampler), "sampler_0");
        assert_eq!(mangler.get("other", other), "other");
    }

    #[test]
    fn mangler_avoids_existing_names() {
        let mut rodeo = lasso::Rodeo::default();
        let a = rodeo.get_or_intern("a");
        let b = rodeo.get_or_intern("b");
        let mut mangler = Mangler::new(&[]);
        assert_eq!(mangler.get("x", a), "x");
        // A different identifier with the same text cannot reuse it.
        assert_eq!(mangler.get("x", b), "x_0");
    }

    #[test]
    fn float_literals_keep_a_decimal_point() {
        assert_eq!(float_lit(1.0), "1.0");
        assert_eq!(float_lit(0.5), "0.5");
        assert_eq!(float_lit(-2.0), "-2.0");
    }
}
