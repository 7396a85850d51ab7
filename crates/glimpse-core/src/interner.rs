// ============================================================================
// String Interning (Dense Label IDs)
// ============================================================================

use ahash::AHashMap;

/// String interner: maps labels to dense `u32` IDs.
///
/// IDs are assigned in first-seen order starting at 0 and are never reused,
/// so `lookup(intern(s)) == s` holds for the interner's whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct StringInterner {
    /// String to ID mapping
    str_to_id: AHashMap<String, u32>,
    /// ID to string mapping (index = ID)
    id_to_str: Vec<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its ID.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }

        let id = self.id_to_str.len() as u32;
        self.str_to_id.insert(s.to_string(), id);
        self.id_to_str.push(s.to_string());
        id
    }

    /// Look up an existing ID for a string without inserting.
    pub fn id_of(&self, s: &str) -> Option<u32> {
        self.str_to_id.get(s).copied()
    }

    /// Look up string by ID
    pub fn lookup(&self, id: u32) -> Option<&str> {
        self.id_to_str.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, s: &str) -> bool {
        self.str_to_id.contains_key(s)
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_stable() {
        let mut interner = StringInterner::new();

        let a = interner.intern("alpha");
        let b = interner.intern("beta");
        let a_again = interner.intern("alpha");

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(a, a_again);
        assert_eq!(interner.len(), 2);
        assert_eq!(interner.lookup(b), Some("beta"));
        assert_eq!(interner.id_of("gamma"), None);
        assert_eq!(interner.lookup(7), None);
    }
}
