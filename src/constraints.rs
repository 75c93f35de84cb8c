use crate::condition::Condition;
use crate::context::ChunkBuildContext;
use crate::identity::{IdentityStore, InstId, OvarId};
use crate::symbol::SymbolStore;
use crate::test::{
    add_test, copy_test, tests_are_equal, Test, TestContent,
};
use crate::wme::WmeField;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// A relational test discovered during backtracing, paired with the
/// equality test it modifies. Cached because the condition it belongs
/// on may not have been reconstructed yet when it is found.
#[derive(Debug, Clone)]
pub struct CachedConstraint {
    /// The equality test establishing the constrained binding.
    pub eq: Test,
    /// The non-equality test to re-attach.
    pub rel: Test,
}

/// Build-scoped list of cached constraints.
pub struct ConstraintCache {
    items: Vec<CachedConstraint>,
}

impl ConstraintCache {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedConstraint> {
        self.items.iter()
    }

    /// Scan a condition's attribute and value tests for relational
    /// constraints hiding in conjunctions. The id slot is never
    /// scanned: its equality test is structural, not a free
    /// constraint.
    ///
    /// # Panics
    ///
    /// Panics if a conjunctive test carries no equality conjunct;
    /// that is a malformed condition, not a runtime case.
    pub fn cache_constraints_in_cond(&mut self, cond: &Condition) {
        let Some(data) = cond.data() else { return };
        for field in [WmeField::Attr, WmeField::Value] {
            let test = data.tests.slot(field);
            let TestContent::Conjunction(conjuncts) = &test.content else {
                continue;
            };
            let eq = test
                .equality_test()
                .unwrap_or_else(|| {
                    panic!("conjunctive test has no equality conjunct")
                })
                .clone();
            for conjunct in conjuncts {
                match &conjunct.content {
                    TestContent::Relational(_, _) | TestContent::Disjunction(_) => {
                        self.items.push(CachedConstraint {
                            eq: eq.clone(),
                            rel: conjunct.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Default for ConstraintCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an o-id's binding is established: the first positive
/// condition whose equality test on `field` carries that identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPoint {
    /// Index into the final condition list.
    pub cond: usize,
    pub field: WmeField,
}

/// Single forward pass recording, for each generalizable o-id, the
/// first positive condition establishing it. First writer wins; later
/// positive conditions referencing the same o-id never override.
pub fn find_attachment_points(
    ctx: &mut ChunkBuildContext,
    ids: &IdentityStore,
    conds: &[Condition],
) {
    for (index, cond) in conds.iter().enumerate() {
        if !cond.is_positive() {
            continue;
        }
        let data = cond.data().expect("positive condition has test data");
        for field in [WmeField::Value, WmeField::Attr] {
            let Some(eq) = data.tests.slot(field).equality_test() else {
                continue;
            };
            if eq.identity.o_id.is_none() {
                continue;
            }
            let o_id = ids.resolve_o_id(eq.identity.o_id);
            ctx.attachments
                .entry(o_id)
                .or_insert(AttachmentPoint { cond: index, field });
        }
    }
}

/// Attach every cached constraint to the rewritten condition list.
///
/// Three-way fallback, in order:
/// 1. The equality test's identity has an attachment point on a
///    positive condition: attach the relational test there.
/// 2. The relational test's own referent has one: invert the operator
///    and swap which side carries the equality role, then attach to
///    that condition. This covers the case where the natural anchor
///    was literalized but the opposite operand was not.
/// 3. Neither side is generalizable: drop the constraint; it now
///    relates two constants and chunk matching enforces it
///    implicitly.
///
/// A constraint already present on the target condition (carried
/// along when the condition was copied) is never re-attached.
pub fn add_additional_constraints(
    ctx: &mut ChunkBuildContext,
    symbols: &SymbolStore,
    ids: &mut IdentityStore,
    conds: &mut [Condition],
) {
    let cached: Vec<CachedConstraint> = ctx.constraints.iter().cloned().collect();
    for constraint in cached {
        let eq = copy_test(&constraint.eq, ids, true, InstId::NONE);
        let rel = copy_test(&constraint.rel, ids, true, InstId::NONE);

        let eq_anchor = anchor_for(ctx, ids, conds, eq.identity.o_id);
        if let Some(point) = eq_anchor {
            let mut attached = rel;
            substitute_variable(&mut attached, ctx, symbols, ids);
            attach(conds, point, attached, symbols);
            continue;
        }

        let rel_anchor = anchor_for(ctx, ids, conds, rel.identity.o_id);
        if let Some(point) = rel_anchor {
            // Swap sides: the relational operand becomes the anchor
            // and the (possibly literalized) equality referent becomes
            // the operand, under the inverted operator.
            let TestContent::Relational(op, _) = rel.content else {
                // A disjunction has no single operand to swap; with no
                // equality-side anchor it relates constants only.
                continue;
            };
            let Some(eq_referent) = eq.equality_referent() else {
                continue;
            };
            let mut attached = Test::relational(op.inverted(), eq_referent)
                .with_identity(eq.identity);
            substitute_variable(&mut attached, ctx, symbols, ids);
            attach(conds, point, attached, symbols);
            continue;
        }

        // Both sides literal: nothing to attach.
        #[cfg(feature = "tracing")]
        debug!("constraint dropped, both operands literal");
    }
}

/// The attachment point for an o-id, provided it names a positive
/// condition in the final list.
fn anchor_for(
    ctx: &ChunkBuildContext,
    ids: &IdentityStore,
    conds: &[Condition],
    o_id: OvarId,
) -> Option<AttachmentPoint> {
    if o_id.is_none() {
        return None;
    }
    let point = *ctx.attachments.get(&ids.resolve_o_id(o_id))?;
    if conds.get(point.cond)?.is_positive() {
        Some(point)
    } else {
        None
    }
}

/// Rewrite a test's referent through the variablization table, when a
/// variablization exists.
fn substitute_variable(
    test: &mut Test,
    ctx: &ChunkBuildContext,
    symbols: &SymbolStore,
    ids: &IdentityStore,
) {
    match &mut test.content {
        TestContent::Equality(r) | TestContent::Relational(_, r) => {
            if let Some(var) = ctx.vars.lookup(*r, &test.identity, symbols, ids) {
                *r = var;
            }
        }
        _ => {}
    }
}

/// Fold a test into the condition's slot unless an equal test is
/// already there.
fn attach(
    conds: &mut [Condition],
    point: AttachmentPoint,
    test: Test,
    symbols: &SymbolStore,
) {
    let data = conds[point.cond]
        .data_mut()
        .expect("attachment point names a positive condition");
    let slot = data.tests.slot_mut(point.field);
    let already_present = slot
        .conjuncts()
        .any(|existing| tests_are_equal(existing, &test, symbols, false));
    if already_present {
        return;
    }
    add_test(slot, test);
}
