use hashbrown::HashMap;

use crate::condition::Condition;
use crate::context::ChunkBuildContext;
use crate::identity::{GroundId, Identity, IdentityStore, OvarId};
use crate::symbol::{SymbolId, SymbolStore};
use crate::test::{Test, TestContent};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Canonical key of a variablization entry.
///
/// Grounded constants key by their g-id, so every test tracing to the
/// same runtime value keys to the same entry. Identifiers are never
/// assigned g-ids and key by their (hashconsed) symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKey {
    Ground(GroundId),
    Sym(SymbolId),
}

/// One variablization: the minted chunk variable and whether the
/// source binding was grounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarEntry {
    pub variable: SymbolId,
    pub grounded: bool,
}

/// Build-scoped map from a grounded symbol/o-id to the chunk variable
/// substituted for it.
///
/// One canonical store keyed by [`VarKey`], plus secondary indices by
/// instantiated symbol, by o-id and by original-variable name,
/// because different call sites hold different keys. All lookups for
/// the same binding return the same variable within one build.
pub struct VariablizationTable {
    canonical: HashMap<VarKey, VarEntry>,
    by_symbol: HashMap<SymbolId, VarKey>,
    by_o_id: HashMap<OvarId, VarKey>,
    by_name: HashMap<SymbolId, VarKey>,
    next_counter: u64,
}

impl VariablizationTable {
    pub fn new() -> Self {
        Self {
            canonical: HashMap::new(),
            by_symbol: HashMap::new(),
            by_o_id: HashMap::new(),
            by_name: HashMap::new(),
            next_counter: 1,
        }
    }

    /// The canonical key for a referent under a given identity:
    /// symbol for identifiers, g-id for grounded constants, None for
    /// ungrounded constants (which must stay literal).
    pub fn key_for(
        &self,
        referent: SymbolId,
        identity: &Identity,
        symbols: &SymbolStore,
        ids: &IdentityStore,
    ) -> Option<VarKey> {
        if symbols.is_sti(referent) {
            return Some(VarKey::Sym(referent));
        }
        let g = if !identity.grounding_id.is_none() {
            identity.grounding_id
        } else {
            ids.grounding_for(identity.o_id)
        };
        if g.is_none() {
            None
        } else {
            Some(VarKey::Ground(g))
        }
    }

    /// Record a variablization under every index.
    pub fn store_variablization(
        &mut self,
        key: VarKey,
        instantiated: SymbolId,
        new_variable: SymbolId,
        identity: &Identity,
    ) {
        let entry = VarEntry {
            variable: new_variable,
            grounded: !identity.grounding_id.is_none(),
        };
        self.canonical.insert(key, entry);
        self.by_symbol.insert(instantiated, key);
        if !identity.o_id.is_none() {
            self.by_o_id.insert(identity.o_id, key);
        }
        if let Some(name) = identity.original_var {
            self.by_name.insert(name, key);
        }
    }

    /// Look up by canonical key.
    pub fn get(&self, key: VarKey) -> Option<VarEntry> {
        self.canonical.get(&key).copied()
    }

    /// Look up by the instantiated symbol.
    pub fn get_by_symbol(&self, sym: SymbolId) -> Option<VarEntry> {
        self.by_symbol.get(&sym).and_then(|k| self.get(*k))
    }

    /// Look up by o-id, resolving through the unification map and the
    /// grounding map when the o-id index itself has no entry.
    pub fn get_by_o_id(&self, o_id: OvarId, ids: &IdentityStore) -> Option<VarEntry> {
        if let Some(key) = self.by_o_id.get(&o_id) {
            return self.get(*key);
        }
        let resolved = ids.resolve_o_id(o_id);
        if let Some(key) = self.by_o_id.get(&resolved) {
            return self.get(*key);
        }
        let g = ids.grounding_for(resolved);
        if g.is_none() {
            None
        } else {
            self.get(VarKey::Ground(g))
        }
    }

    /// Look up by the original variable name.
    pub fn get_by_name(&self, name: SymbolId) -> Option<VarEntry> {
        self.by_name.get(&name).and_then(|k| self.get(*k))
    }

    /// The variablization for a referent under an identity, or mint
    /// and record a fresh chunk variable when none exists yet.
    /// Returns None when the referent is an ungrounded constant.
    pub fn variablize(
        &mut self,
        referent: SymbolId,
        identity: &Identity,
        symbols: &SymbolStore,
        ids: &IdentityStore,
    ) -> Option<SymbolId> {
        let key = self.key_for(referent, identity, symbols, ids)?;
        if let Some(entry) = self.get(key) {
            // Refresh secondary indices; a later call site may hold a
            // key the first one did not.
            self.by_symbol.insert(referent, key);
            if !identity.o_id.is_none() {
                self.by_o_id.insert(identity.o_id, key);
            }
            if let Some(name) = identity.original_var {
                self.by_name.insert(name, key);
            }
            return Some(entry.variable);
        }
        let minted =
            symbols.chunk_variable(identity.original_var, self.next_counter);
        self.next_counter += 1;
        self.store_variablization(key, referent, minted, identity);
        #[cfg(feature = "tracing")]
        debug!(
            referent = referent.raw(),
            variable = minted.raw(),
            "variablize"
        );
        Some(minted)
    }

    /// Lookup-only form of [`variablize`]: never mints.
    pub fn lookup(
        &self,
        referent: SymbolId,
        identity: &Identity,
        symbols: &SymbolStore,
        ids: &IdentityStore,
    ) -> Option<SymbolId> {
        let key = self.key_for(referent, identity, symbols, ids)?;
        self.get(key).map(|entry| entry.variable)
    }
}

impl Default for VariablizationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Variablize every test of a reconstructed condition list in place.
///
/// Positive conditions establish variablizations (equality tests
/// mint); everything else, including negative conditions and NCCs,
/// only substitutes variables already in the table. Ungrounded
/// constants stay literal.
pub fn variablize_condition_list(
    ctx: &mut ChunkBuildContext,
    symbols: &SymbolStore,
    ids: &IdentityStore,
    conds: &mut [Condition],
) {
    for cond in conds.iter_mut() {
        match cond {
            Condition::Positive(data) => {
                variablize_test(&mut data.tests.id, ctx, symbols, ids, true);
                variablize_test(&mut data.tests.attr, ctx, symbols, ids, true);
                variablize_test(&mut data.tests.value, ctx, symbols, ids, true);
            }
            Condition::Negative(data) => {
                variablize_test(&mut data.tests.id, ctx, symbols, ids, false);
                variablize_test(&mut data.tests.attr, ctx, symbols, ids, false);
                variablize_test(&mut data.tests.value, ctx, symbols, ids, false);
            }
            Condition::Ncc(children) => {
                variablize_ncc(children, ctx, symbols, ids);
            }
        }
    }
}

fn variablize_ncc(
    conds: &mut [Condition],
    ctx: &mut ChunkBuildContext,
    symbols: &SymbolStore,
    ids: &IdentityStore,
) {
    for cond in conds.iter_mut() {
        match cond {
            Condition::Positive(data) | Condition::Negative(data) => {
                variablize_test(&mut data.tests.id, ctx, symbols, ids, false);
                variablize_test(&mut data.tests.attr, ctx, symbols, ids, false);
                variablize_test(&mut data.tests.value, ctx, symbols, ids, false);
            }
            Condition::Ncc(children) => {
                variablize_ncc(children, ctx, symbols, ids);
            }
        }
    }
}

fn variablize_test(
    test: &mut Test,
    ctx: &mut ChunkBuildContext,
    symbols: &SymbolStore,
    ids: &IdentityStore,
    may_mint: bool,
) {
    match &mut test.content {
        TestContent::Conjunction(conjuncts) => {
            for conjunct in conjuncts.iter_mut() {
                variablize_test(conjunct, ctx, symbols, ids, may_mint);
            }
        }
        TestContent::Blank
        | TestContent::GoalId
        | TestContent::ImpasseId
        | TestContent::Disjunction(_) => {}
        TestContent::Equality(r) => {
            let replacement = if may_mint {
                ctx.vars.variablize(*r, &test.identity, symbols, ids)
            } else {
                ctx.vars.lookup(*r, &test.identity, symbols, ids)
            };
            if let Some(var) = replacement {
                *r = var;
            }
        }
        TestContent::Relational(_, r) => {
            // Relational referents never mint; they piggyback on the
            // equality test that established the binding.
            if let Some(var) = ctx.vars.lookup(*r, &test.identity, symbols, ids) {
                *r = var;
            }
        }
    }
}
