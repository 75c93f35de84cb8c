use crate::identity::GroundId;
use crate::symbol::SymbolId;

/// Goal-stack level a binding was made at. Level 1 is the top goal;
/// deeper subgoals get higher numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalLevel(pub u32);

/// Which field of a wme a test or grounding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WmeField {
    Id,
    Attr,
    Value,
}

/// Unique identifier for a wme in the wme store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WmeId(u32);

impl WmeId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Unique identifier for a preference in the wme store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefId(u32);

/// A working-memory element: an (id, attr, value) triple plus the
/// preference that produced it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wme {
    pub id: SymbolId,
    pub attr: SymbolId,
    pub value: SymbolId,
    /// Acceptable-preference wme flag.
    pub acceptable: bool,
    /// Back-link to the preference whose firing created this wme.
    pub pref: Option<PrefId>,
}

impl Wme {
    /// The symbol at the given field.
    pub fn field(&self, field: WmeField) -> SymbolId {
        match field {
            WmeField::Id => self.id,
            WmeField::Attr => self.attr,
            WmeField::Value => self.value,
        }
    }
}

/// The preference that created a wme. Carries the grounding ids its
/// instantiation already traced for each field, at its binding level.
/// When a wme is re-grounded at the same level, these are the single
/// source of truth rather than freshly minted ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preference {
    pub id: SymbolId,
    pub attr: SymbolId,
    pub value: SymbolId,
    /// Level the preference's instantiation matched at.
    pub level: GoalLevel,
    /// Grounding ids for id/attr/value, NONE where untraced.
    pub g_ids: [GroundId; 3],
}

impl Preference {
    /// The grounding id this preference carries for a field.
    pub fn g_id(&self, field: WmeField) -> GroundId {
        match field {
            WmeField::Id => self.g_ids[0],
            WmeField::Attr => self.g_ids[1],
            WmeField::Value => self.g_ids[2],
        }
    }
}

/// Slot arena for wmes and preferences.
///
/// Removal leaves a hole rather than shifting ids, so a WmeId held in
/// a Test's Identity after the wme left working memory is a *stale*
/// weak handle: `get` returns None and callers treat it as "no
/// grounding wme".
pub struct WmeStore {
    wmes: Vec<Option<Wme>>,
    prefs: Vec<Preference>,
}

impl WmeStore {
    /// Create a new empty wme store.
    pub fn new() -> Self {
        Self {
            wmes: Vec::new(),
            prefs: Vec::new(),
        }
    }

    /// Add a wme, returning its id.
    pub fn add(&mut self, wme: Wme) -> WmeId {
        let id = WmeId(self.wmes.len() as u32);
        self.wmes.push(Some(wme));
        id
    }

    /// Remove a wme from working memory. Ids handed out earlier go
    /// stale rather than being reused.
    pub fn remove(&mut self, id: WmeId) {
        if let Some(slot) = self.wmes.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    /// Resolve a WmeId. None for invalid or removed wmes.
    pub fn get(&self, id: WmeId) -> Option<&Wme> {
        self.wmes.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Add a preference, returning its id.
    pub fn add_pref(&mut self, pref: Preference) -> PrefId {
        let id = PrefId(self.prefs.len() as u32);
        self.prefs.push(pref);
        id
    }

    /// Resolve a PrefId.
    pub fn pref(&self, id: PrefId) -> Option<&Preference> {
        self.prefs.get(id.0 as usize)
    }

    /// Number of live wmes.
    pub fn len(&self) -> usize {
        self.wmes.iter().filter(|slot| slot.is_some()).count()
    }

    /// True if no live wmes remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WmeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolStore;

    fn setup() -> (SymbolStore, WmeStore) {
        (SymbolStore::new(), WmeStore::new())
    }

    fn make_wme(symbols: &SymbolStore) -> Wme {
        Wme {
            id: symbols.identifier(b'B', 3),
            attr: symbols.str_const("color"),
            value: symbols.str_const("red"),
            acceptable: false,
            pref: None,
        }
    }

    #[test]
    fn add_and_get_wme() {
        let (symbols, mut wmes) = setup();
        let wme = make_wme(&symbols);
        let id = wmes.add(wme);
        assert_eq!(wmes.get(id), Some(&wme));
    }

    #[test]
    fn field_access() {
        let (symbols, _) = setup();
        let wme = make_wme(&symbols);
        assert_eq!(wme.field(WmeField::Id), symbols.identifier(b'B', 3));
        assert_eq!(wme.field(WmeField::Attr), symbols.str_const("color"));
        assert_eq!(wme.field(WmeField::Value), symbols.str_const("red"));
    }

    #[test]
    fn removed_wme_id_goes_stale() {
        let (symbols, mut wmes) = setup();
        let id = wmes.add(make_wme(&symbols));
        wmes.remove(id);
        assert_eq!(
            wmes.get(id),
            None,
            "Stale WmeId must resolve to None, not to a reused slot"
        );
    }

    #[test]
    fn remove_does_not_shift_other_ids() {
        let (symbols, mut wmes) = setup();
        let a = wmes.add(make_wme(&symbols));
        let mut second = make_wme(&symbols);
        second.value = symbols.str_const("blue");
        let b = wmes.add(second);
        wmes.remove(a);
        assert_eq!(wmes.get(b).map(|w| w.value), Some(symbols.str_const("blue")));
        assert_eq!(wmes.len(), 1);
    }

    #[test]
    fn preference_field_g_ids() {
        let (symbols, mut wmes) = setup();
        let g = GroundId(7);
        let pref = Preference {
            id: symbols.identifier(b'B', 3),
            attr: symbols.str_const("color"),
            value: symbols.str_const("red"),
            level: GoalLevel(2),
            g_ids: [GroundId::NONE, GroundId::NONE, g],
        };
        let pid = wmes.add_pref(pref);
        let stored = wmes.pref(pid).unwrap();
        assert_eq!(stored.g_id(WmeField::Value), g);
        assert_eq!(stored.g_id(WmeField::Id), GroundId::NONE);
    }

    #[test]
    fn get_invalid_id_returns_none() {
        let (_, wmes) = setup();
        assert_eq!(wmes.get(WmeId(42)), None);
    }
}
