use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::condition::Condition;
use crate::symbol::{SymbolId, SymbolStore};
use crate::test::{Test, TestContent};
use crate::wme::{GoalLevel, WmeField, WmeId, WmeStore};

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Identifier for one production firing. Zero is the "no
/// instantiation" sentinel used when copying tests outside any
/// particular firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u64);

impl InstId {
    pub const NONE: InstId = InstId(0);
}

/// Original-variable id: process-unique handle for "this occurrence
/// of this variable within this instantiation". Zero is the "no
/// identity" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OvarId(pub u64);

impl OvarId {
    pub const NONE: OvarId = OvarId(0);

    pub fn is_none(self) -> bool {
        self == OvarId::NONE
    }
}

/// Grounding id: process-unique handle for "this runtime value,
/// traced back to its origin". Zero is the "non-generalizable, must
/// stay literal" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroundId(pub u64);

impl GroundId {
    pub const NONE: GroundId = GroundId(0);

    pub fn is_none(self) -> bool {
        self == GroundId::NONE
    }
}

/// Per-test identity metadata: where the tested value came from and
/// which variable occurrence it descends from.
///
/// `grounding_id == NONE` means the symbol must remain literal in any
/// chunk built from this test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity {
    /// The variable used in the original rule text, if any.
    pub original_var: Option<SymbolId>,
    /// o-id of this variable occurrence.
    pub o_id: OvarId,
    /// g-id of the traced runtime value; NONE = not generalizable.
    pub grounding_id: GroundId,
    /// Which wme field the grounding came from.
    pub grounding_field: Option<WmeField>,
    /// Weak handle to the grounding wme. Stale once the wme leaves
    /// working memory; resolve through the store before use.
    pub grounding_wme: Option<WmeId>,
}

/// Process-wide identity state: o-id and g-id minting, the
/// unification map built during negation/backtrace reconciliation,
/// the o-id -> g-id grounding map, and the level-sensitive g-id
/// cache.
///
/// The g-id cache is keyed by (wme, field, goal level): the same wme
/// visible at two subgoal levels grounds to two distinct g-ids.
pub struct IdentityStore {
    next_o_id: u64,
    next_g_id: u64,
    o_ids: HashMap<(SymbolId, InstId), OvarId>,
    /// Debug-reversible: which variable an o-id was minted for.
    o_id_names: HashMap<OvarId, SymbolId>,
    /// "This o-id was later found to be the same binding as that one."
    unification_map: HashMap<OvarId, OvarId>,
    grounding_map: HashMap<OvarId, GroundId>,
    ground_ids: HashMap<(WmeId, WmeField, GoalLevel), GroundId>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self {
            next_o_id: 1,
            next_g_id: 1,
            o_ids: HashMap::new(),
            o_id_names: HashMap::new(),
            unification_map: HashMap::new(),
            grounding_map: HashMap::new(),
            ground_ids: HashMap::new(),
        }
    }

    /// The o-id for this variable occurrence within this
    /// instantiation, minting one on first sight.
    pub fn get_or_create_o_id(&mut self, var: SymbolId, inst: InstId) -> OvarId {
        if let Some(&o) = self.o_ids.get(&(var, inst)) {
            return o;
        }
        let o = OvarId(self.next_o_id);
        self.next_o_id += 1;
        self.o_ids.insert((var, inst), o);
        self.o_id_names.insert(o, var);
        o
    }

    /// The variable an o-id was minted for.
    pub fn o_id_to_var(&self, o_id: OvarId) -> Option<SymbolId> {
        self.o_id_names.get(&o_id).copied()
    }

    /// Mint a fresh grounding id.
    pub fn mint_g_id(&mut self) -> GroundId {
        let g = GroundId(self.next_g_id);
        self.next_g_id += 1;
        g
    }

    /// Record that `from` was found to be the same binding as `to`.
    pub fn unify_o_ids(&mut self, from: OvarId, to: OvarId) {
        if from == to || from.is_none() || to.is_none() {
            return;
        }
        self.unification_map.insert(from, to);
    }

    /// Resolve an o-id through the unification map, following chains
    /// with a cycle guard.
    pub fn resolve_o_id(&self, o_id: OvarId) -> OvarId {
        let mut current = o_id;
        let mut visited: SmallVec<[OvarId; 8]> = SmallVec::new();
        while let Some(&next) = self.unification_map.get(&current) {
            if visited.contains(&next) {
                return current;
            }
            visited.push(current);
            current = next;
        }
        current
    }

    /// Record o-id -> g-id. The NONE sentinel on either side is never
    /// recorded.
    pub fn record_grounding(&mut self, o_id: OvarId, g_id: GroundId) {
        if o_id.is_none() || g_id.is_none() {
            return;
        }
        self.grounding_map.insert(self.resolve_o_id(o_id), g_id);
    }

    /// The g-id already recorded for an o-id, NONE when ungrounded.
    pub fn grounding_for(&self, o_id: OvarId) -> GroundId {
        self.grounding_map
            .get(&self.resolve_o_id(o_id))
            .copied()
            .unwrap_or(GroundId::NONE)
    }

    /// The g-id for a (wme, field, level) triple.
    ///
    /// Returns the cached id when one exists. Otherwise, when the
    /// preference that produced the wme was bound at this level and
    /// already carries a g-id for the field, that id is propagated
    /// down (the preference is the single source of truth); else a
    /// fresh id is minted. Idempotent per triple.
    pub fn get_ground_id(
        &mut self,
        wme_id: WmeId,
        field: WmeField,
        level: GoalLevel,
        wmes: &WmeStore,
    ) -> GroundId {
        if let Some(&g) = self.ground_ids.get(&(wme_id, field, level)) {
            return g;
        }
        let from_pref = wmes
            .get(wme_id)
            .and_then(|wme| wme.pref)
            .and_then(|pid| wmes.pref(pid))
            .filter(|pref| pref.level == level)
            .map(|pref| pref.g_id(field))
            .filter(|g| !g.is_none());
        let g = match from_pref {
            Some(g) => g,
            None => self.mint_g_id(),
        };
        self.ground_ids.insert((wme_id, field, level), g);
        g
    }

    /// Walk every condition and attach grounding information to each
    /// test slot. Positive conditions establish grounding; conditions
    /// in a negative or conjunctive-negation context only consume
    /// grounding already recorded.
    pub fn propagate_identity(
        &mut self,
        conds: &mut [Condition],
        level: GoalLevel,
        symbols: &SymbolStore,
        wmes: &WmeStore,
    ) {
        #[cfg(feature = "tracing")]
        trace!(conds = conds.len(), level = level.0, "propagate_identity");
        for cond in conds.iter_mut() {
            match cond {
                Condition::Positive(data) => {
                    let wme = data.wme;
                    for field in [WmeField::Id, WmeField::Attr, WmeField::Value] {
                        self.add_identity_to_test(
                            data.tests.slot_mut(field),
                            field,
                            wme,
                            level,
                            symbols,
                            wmes,
                        );
                    }
                }
                Condition::Negative(data) => {
                    for field in [WmeField::Id, WmeField::Attr, WmeField::Value] {
                        self.add_identity_to_negative_test(
                            data.tests.slot_mut(field),
                            symbols,
                        );
                    }
                }
                Condition::Ncc(children) => {
                    self.propagate_identity_negative(children, symbols);
                }
            }
        }
    }

    fn propagate_identity_negative(
        &mut self,
        conds: &mut [Condition],
        symbols: &SymbolStore,
    ) {
        for cond in conds.iter_mut() {
            match cond {
                Condition::Positive(data) | Condition::Negative(data) => {
                    for field in [WmeField::Id, WmeField::Attr, WmeField::Value] {
                        self.add_identity_to_negative_test(
                            data.tests.slot_mut(field),
                            symbols,
                        );
                    }
                }
                Condition::Ncc(children) => {
                    self.propagate_identity_negative(children, symbols);
                }
            }
        }
    }

    /// Ground one test slot of a positive condition.
    ///
    /// Only the equality test receives the slot's g-id; non-equality
    /// conjuncts ground through their own o-id, or not at all.
    /// Identifier values never receive a g-id; they generalize by
    /// symbol identity alone. A condition with no matched wme is a
    /// legitimate nothing-to-do case.
    pub fn add_identity_to_test(
        &mut self,
        test: &mut Test,
        field: WmeField,
        wme_id: Option<WmeId>,
        level: GoalLevel,
        symbols: &SymbolStore,
        wmes: &WmeStore,
    ) {
        match &mut test.content {
            TestContent::Conjunction(conjuncts) => {
                for conjunct in conjuncts.iter_mut() {
                    self.add_identity_to_test(
                        conjunct, field, wme_id, level, symbols, wmes,
                    );
                }
            }
            TestContent::Blank
            | TestContent::GoalId
            | TestContent::ImpasseId
            | TestContent::Disjunction(_) => {}
            TestContent::Equality(_) => {
                if test.identity.grounding_field.is_none() {
                    test.identity.grounding_field = Some(field);
                }
                let Some(wme_id) = wme_id else { return };
                let Some(wme) = wmes.get(wme_id) else { return };
                test.identity.grounding_wme = Some(wme_id);
                let gfield = test.identity.grounding_field.unwrap_or(field);
                let bound = wme.field(gfield);
                if symbols.is_sti(bound) {
                    // Identifiers are excluded from g-id assignment.
                    return;
                }
                let g = self.get_ground_id(wme_id, gfield, level, wmes);
                test.identity.grounding_id = g;
                if !test.identity.o_id.is_none() {
                    self.record_grounding(test.identity.o_id, g);
                }
            }
            TestContent::Relational(_, _) => {
                // The slot g-id belongs to the equality binding; a
                // relational referent's provenance is its own o-id.
                if test.identity.grounding_field.is_none() {
                    test.identity.grounding_field = Some(field);
                }
                if !test.identity.o_id.is_none() {
                    let g = self.grounding_for(test.identity.o_id);
                    if !g.is_none() {
                        test.identity.grounding_id = g;
                    }
                }
            }
        }
    }

    /// Ground one test slot inside a negative or NCC context.
    ///
    /// Never mints a g-id: only looks up a grounding already recorded
    /// for the test's o-id, and only when the referent is neither an
    /// identifier nor a bare variable.
    pub fn add_identity_to_negative_test(
        &mut self,
        test: &mut Test,
        symbols: &SymbolStore,
    ) {
        match &mut test.content {
            TestContent::Conjunction(conjuncts) => {
                for conjunct in conjuncts.iter_mut() {
                    self.add_identity_to_negative_test(conjunct, symbols);
                }
            }
            TestContent::Blank
            | TestContent::GoalId
            | TestContent::ImpasseId
            | TestContent::Disjunction(_) => {}
            TestContent::Equality(r) | TestContent::Relational(_, r) => {
                let referent = *r;
                if symbols.is_sti(referent) || symbols.is_variable(referent) {
                    return;
                }
                if test.identity.o_id.is_none() {
                    return;
                }
                let g = self.grounding_for(test.identity.o_id);
                if !g.is_none() {
                    test.identity.grounding_id = g;
                }
            }
        }
    }
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}
