use hashbrown::{HashMap, HashSet};

use crate::constraints::{AttachmentPoint, ConstraintCache};
use crate::identity::OvarId;
use crate::symbol::SymbolId;
use crate::test::Test;
use crate::variablize::VariablizationTable;

/// All state scoped to one chunk build.
///
/// Constructed when a build starts and dropped when it ends. Nothing
/// carries over between builds; there is no clear step to forget.
pub struct ChunkBuildContext {
    /// Symbol/o-id -> minted chunk variable.
    pub vars: VariablizationTable,
    /// Relational tests discovered during backtracing, awaiting
    /// re-attachment.
    pub constraints: ConstraintCache,
    /// First positive condition establishing each o-id's binding.
    pub attachments: HashMap<OvarId, AttachmentPoint>,
    /// o-id -> literal test that must replace any variablized test
    /// with that identity. Populated by grounding-failure detection
    /// before the build runs the literalization pass.
    pub literals: HashMap<OvarId, Test>,
    /// Chunk variables whose o-id was later literalized; the RHS
    /// variablizer must emit the literal, not the variable.
    pub literalized: HashSet<SymbolId>,
}

impl ChunkBuildContext {
    pub fn new() -> Self {
        Self {
            vars: VariablizationTable::new(),
            constraints: ConstraintCache::new(),
            attachments: HashMap::new(),
            literals: HashMap::new(),
            literalized: HashSet::new(),
        }
    }
}

impl Default for ChunkBuildContext {
    fn default() -> Self {
        Self::new()
    }
}
