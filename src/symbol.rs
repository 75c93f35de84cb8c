use hashbrown::HashMap;
use lasso::{Spur, ThreadedRodeo};
use parking_lot::RwLock;

/// Unique identifier for a symbol in the symbol store.
/// SymbolIds are stable and can be compared for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A symbol is a variable, a short-term identifier, or a constant.
///
/// Identifiers (STIs) name working-memory objects and are never
/// assigned grounding ids; constants are the values a chunk may
/// generalize over; variables only occur in original rule text and
/// in freshly minted chunk variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A rule variable, e.g. `<b>`. Payload is the interned name
    /// including the angle brackets.
    Variable(Spur),
    /// A short-term identifier, e.g. `B3`.
    Identifier { letter: u8, number: u64 },
    /// A string constant, e.g. `red`.
    Str(Spur),
    /// An integer constant.
    Int(i64),
}

/// Hashconsed symbol store.
///
/// Guarantees:
/// - Structurally equal symbols get the same SymbolId
/// - SymbolId can be resolved back to the symbol
/// - Ids are stable for the lifetime of the store
///
/// SymbolId is Copy, so tests may duplicate and drop referents freely
/// with no lifetime bookkeeping.
pub struct SymbolStore {
    rodeo: ThreadedRodeo,
    nodes: RwLock<Vec<Symbol>>,
    interned: RwLock<HashMap<Symbol, SymbolId>>,
}

impl SymbolStore {
    /// Create a new empty symbol store.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
            nodes: RwLock::new(Vec::new()),
            interned: RwLock::new(HashMap::new()),
        }
    }

    fn intern(&self, sym: Symbol) -> SymbolId {
        // Fast path: already interned (read lock).
        {
            let map = self.interned.read();
            if let Some(&id) = map.get(&sym) {
                return id;
            }
        }

        let mut map = self.interned.write();
        // Double-check after acquiring write lock.
        if let Some(&id) = map.get(&sym) {
            return id;
        }
        let mut nodes = self.nodes.write();
        let id = SymbolId(nodes.len() as u32);
        nodes.push(sym);
        map.insert(sym, id);
        id
    }

    /// Intern a rule variable by name, e.g. `"<b>"`.
    pub fn variable(&self, name: &str) -> SymbolId {
        let spur = self.rodeo.get_or_intern(name);
        self.intern(Symbol::Variable(spur))
    }

    /// Intern a short-term identifier, e.g. `('B', 3)` for `B3`.
    pub fn identifier(&self, letter: u8, number: u64) -> SymbolId {
        self.intern(Symbol::Identifier { letter, number })
    }

    /// Intern a string constant.
    pub fn str_const(&self, value: &str) -> SymbolId {
        let spur = self.rodeo.get_or_intern(value);
        self.intern(Symbol::Str(spur))
    }

    /// Intern an integer constant.
    pub fn int_const(&self, value: i64) -> SymbolId {
        self.intern(Symbol::Int(value))
    }

    /// Resolve a SymbolId to its symbol.
    /// Returns None if the SymbolId is invalid for this store.
    pub fn resolve(&self, id: SymbolId) -> Option<Symbol> {
        let nodes = self.nodes.read();
        nodes.get(id.0 as usize).copied()
    }

    /// True if the symbol is a short-term identifier.
    pub fn is_sti(&self, id: SymbolId) -> bool {
        matches!(self.resolve(id), Some(Symbol::Identifier { .. }))
    }

    /// True if the symbol is a rule variable.
    pub fn is_variable(&self, id: SymbolId) -> bool {
        matches!(self.resolve(id), Some(Symbol::Variable(_)))
    }

    /// True if two symbols have the same type (variable, identifier,
    /// string, integer). Backs the same-type relational test.
    pub fn same_type(&self, a: SymbolId, b: SymbolId) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(sa), Some(sb)) => {
                std::mem::discriminant(&sa) == std::mem::discriminant(&sb)
            }
            _ => false,
        }
    }

    /// Render a symbol for display and debug dumps.
    pub fn name(&self, id: SymbolId) -> String {
        match self.resolve(id) {
            Some(Symbol::Variable(spur)) | Some(Symbol::Str(spur)) => {
                self.rodeo.resolve(&spur).to_string()
            }
            Some(Symbol::Identifier { letter, number }) => {
                format!("{}{}", letter as char, number)
            }
            Some(Symbol::Int(v)) => v.to_string(),
            None => format!("?{}", id.0),
        }
    }

    /// Mint a fresh chunk variable. When the original variable name is
    /// known, the new name is derived from it (`<b>` -> `<b*1>`);
    /// otherwise a plain counter name (`<v1>`) is used.
    pub fn chunk_variable(&self, base: Option<SymbolId>, counter: u64) -> SymbolId {
        let name = match base.and_then(|b| self.resolve(b)) {
            Some(Symbol::Variable(spur)) => {
                let raw = self.rodeo.resolve(&spur);
                let stem = raw.trim_start_matches('<').trim_end_matches('>');
                format!("<{}*{}>", stem, counter)
            }
            _ => format!("<v{}>", counter),
        };
        self.variable(&name)
    }

    /// Number of distinct symbols interned so far.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True if no symbols have been interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}
