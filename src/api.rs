//! Top-level entry point tying the chunk-building passes together.

use hashbrown::HashMap;

use crate::condition::Condition;
use crate::constraints::{add_additional_constraints, find_attachment_points};
use crate::context::ChunkBuildContext;
use crate::identity::{IdentityStore, InstId, OvarId};
use crate::literalize::install_literal_constraints;
use crate::merge::{merge_conditions, remove_dupe_conditions};
use crate::symbol::SymbolStore;
use crate::test::Test;
use crate::variablize::variablize_condition_list;
use crate::wme::{GoalLevel, WmeStore};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// A rule match whose explanation is about to be generalized.
///
/// Conditions are the backtraced, reconstructed condition list in
/// match order. `literals` carries the identities found to be
/// level-specific during backtracing, each with the literal test that
/// must replace its generalization.
pub struct Instantiation {
    pub conditions: Vec<Condition>,
    pub inst_id: InstId,
    /// Goal level the match fired at.
    pub match_level: GoalLevel,
    pub literals: HashMap<OvarId, Test>,
}

impl Instantiation {
    /// Append a reconstructed condition.
    pub fn push(&mut self, cond: Condition) {
        self.conditions.push(cond);
    }

    /// Mark an identity as non-generalizable, recording the literal
    /// test to install in its place.
    pub fn literalize(&mut self, o_id: OvarId, literal: Test) {
        self.literals.insert(o_id, literal);
    }
}

/// Owns the long-lived stores and drives chunk formation.
pub struct Chunker {
    symbols: SymbolStore,
    wmes: WmeStore,
    ids: IdentityStore,
    next_inst: u64,
}

impl Chunker {
    pub fn new() -> Self {
        Self {
            symbols: SymbolStore::new(),
            wmes: WmeStore::new(),
            ids: IdentityStore::new(),
            next_inst: 1,
        }
    }

    pub fn symbols(&self) -> &SymbolStore {
        &self.symbols
    }

    pub fn wmes(&self) -> &WmeStore {
        &self.wmes
    }

    pub fn wmes_mut(&mut self) -> &mut WmeStore {
        &mut self.wmes
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.ids
    }

    pub fn identities_mut(&mut self) -> &mut IdentityStore {
        &mut self.ids
    }

    /// Start an empty instantiation at the given match level.
    pub fn new_instantiation(&mut self, match_level: GoalLevel) -> Instantiation {
        let inst_id = InstId(self.next_inst);
        self.next_inst += 1;
        Instantiation {
            conditions: Vec::new(),
            inst_id,
            match_level,
            literals: HashMap::new(),
        }
    }

    /// Generalize an instantiation's conditions into chunk conditions.
    ///
    /// Passes run in a fixed order over a build-scoped context:
    /// identity propagation grounds every test, relational constraints
    /// are cached off the raw conditions, grounded bindings are
    /// variablized, level-specific identities are re-literalized,
    /// same-slot conditions merge and duplicates drop, and finally the
    /// cached constraints re-attach where their bindings are
    /// established.
    pub fn build_chunk(&mut self, mut inst: Instantiation) -> Vec<Condition> {
        let mut ctx = ChunkBuildContext::new();
        let conds = &mut inst.conditions;

        self.ids
            .propagate_identity(conds, inst.match_level, &self.symbols, &self.wmes);

        for cond in conds.iter() {
            if cond.is_positive() {
                ctx.constraints.cache_constraints_in_cond(cond);
            }
        }

        variablize_condition_list(&mut ctx, &self.symbols, &self.ids, conds);

        ctx.literals = inst.literals;
        install_literal_constraints(&mut ctx, &self.ids, conds);

        merge_conditions(conds, &self.symbols);
        remove_dupe_conditions(conds, &self.symbols);

        find_attachment_points(&mut ctx, &self.ids, conds);
        add_additional_constraints(&mut ctx, &self.symbols, &mut self.ids, conds);

        #[cfg(feature = "tracing")]
        debug!(
            inst = inst.inst_id.0,
            conds = conds.len(),
            "chunk conditions built"
        );

        inst.conditions
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}
