use crate::condition::Condition;
use crate::context::ChunkBuildContext;
use crate::identity::IdentityStore;
use crate::test::{Test, TestContent};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Replace variablized tests whose identity was marked non-general
/// with the literal test recorded for that identity.
///
/// Runs after variablization: a binding can be discovered to be
/// level-specific only once all its uses have been seen, so the
/// variable is minted first and retracted here. The attribute and
/// value slots of every condition are walked, including negatives and
/// nested NCCs; the id slot always stays variablized because
/// identifiers are never literal.
pub fn install_literal_constraints(
    ctx: &mut ChunkBuildContext,
    ids: &IdentityStore,
    conds: &mut [Condition],
) {
    if ctx.literals.is_empty() {
        return;
    }
    for cond in conds.iter_mut() {
        match cond {
            Condition::Positive(data) | Condition::Negative(data) => {
                literalize_test(&mut data.tests.attr, ctx, ids);
                literalize_test(&mut data.tests.value, ctx, ids);
            }
            Condition::Ncc(children) => {
                install_literal_children(children, ctx, ids);
            }
        }
    }
}

fn install_literal_children(
    conds: &mut [Condition],
    ctx: &mut ChunkBuildContext,
    ids: &IdentityStore,
) {
    for cond in conds.iter_mut() {
        match cond {
            Condition::Positive(data) | Condition::Negative(data) => {
                literalize_test(&mut data.tests.attr, ctx, ids);
                literalize_test(&mut data.tests.value, ctx, ids);
            }
            Condition::Ncc(children) => {
                install_literal_children(children, ctx, ids);
            }
        }
    }
}

fn literalize_test(test: &mut Test, ctx: &mut ChunkBuildContext, ids: &IdentityStore) {
    if let TestContent::Conjunction(conjuncts) = &mut test.content {
        for conjunct in conjuncts.iter_mut() {
            literalize_test(conjunct, ctx, ids);
        }
        return;
    }
    if test.identity.o_id.is_none() {
        return;
    }
    let o_id = ids.resolve_o_id(test.identity.o_id);
    let Some(literal) = ctx.literals.get(&o_id) else {
        return;
    };
    // The variable already minted for this identity must not survive
    // into the action side either.
    if let Some(entry) = ctx.vars.get_by_o_id(o_id, ids) {
        ctx.literalized.insert(entry.variable);
    }
    #[cfg(feature = "tracing")]
    debug!(o_id = o_id.0, "literalizing test");
    *test = literal.clone();
}
