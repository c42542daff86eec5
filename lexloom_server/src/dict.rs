// The dictionary seam.
//
// The server never parses dictionary files itself; it asks a `Dictionary`
// for tile facts and word lookups, and ships the host's dictionary to
// guests as opaque bytes the application's own loader understands.

use lexloom_protocol::types::Tile;

pub trait Dictionary {
    /// Number of distinct tile faces, blank included.
    fn n_faces(&self) -> u8;

    /// How many of this face a fresh pool holds.
    fn count_for(&self, tile: Tile) -> u8;

    /// Score value of this face.
    fn value_of(&self, tile: Tile) -> u8;

    /// Display string for this face.
    fn face(&self, tile: Tile) -> &str;

    fn is_word(&self, word: &str) -> bool;

    /// Serialized form sent to guests in the setup message.
    fn to_bytes(&self) -> Vec<u8>;

    /// Whether two dictionaries agree tile-for-tile. When they do, a guest
    /// may keep its locally installed copy; word lists can still differ,
    /// which is why the host alone judges legality.
    fn tiles_same(&self, other: &dyn Dictionary) -> bool {
        if self.n_faces() != other.n_faces() {
            return false;
        }
        (0..self.n_faces()).all(|face| {
            let tile = Tile(face);
            self.count_for(tile) == other.count_for(tile)
                && self.value_of(tile) == other.value_of(tile)
                && self.face(tile) == other.face(tile)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fixed-table dictionary for tests: faces with counts and values,
    /// plus an explicit word list.
    pub(crate) struct WordListDict {
        faces: Vec<(String, u8, u8)>,
        words: Vec<String>,
    }

    impl WordListDict {
        pub(crate) fn new(faces: &[(&str, u8, u8)], words: &[&str]) -> WordListDict {
            WordListDict {
                faces: faces
                    .iter()
                    .map(|(face, count, value)| (face.to_string(), *count, *value))
                    .collect(),
                words: words.iter().map(|word| word.to_string()).collect(),
            }
        }
    }

    impl Dictionary for WordListDict {
        fn n_faces(&self) -> u8 {
            #[expect(clippy::cast_possible_truncation)]
            let n = self.faces.len() as u8;
            n
        }

        fn count_for(&self, tile: Tile) -> u8 {
            self.faces[usize::from(tile.0)].1
        }

        fn value_of(&self, tile: Tile) -> u8 {
            self.faces[usize::from(tile.0)].2
        }

        fn face(&self, tile: Tile) -> &str {
            &self.faces[usize::from(tile.0)].0
        }

        fn is_word(&self, word: &str) -> bool {
            self.words.iter().any(|known| known == word)
        }

        fn to_bytes(&self) -> Vec<u8> {
            let mut out = Vec::new();
            for (face, count, value) in &self.faces {
                out.extend_from_slice(face.as_bytes());
                out.push(*count);
                out.push(*value);
            }
            out
        }
    }

    #[test]
    fn tiles_same_ignores_word_lists() {
        let a = WordListDict::new(&[("a", 2, 1), ("b", 1, 3)], &["ab"]);
        let b = WordListDict::new(&[("a", 2, 1), ("b", 1, 3)], &["ba", "ab"]);
        assert!(a.tiles_same(&b));
    }

    #[test]
    fn tiles_same_spots_count_drift() {
        let a = WordListDict::new(&[("a", 2, 1)], &[]);
        let b = WordListDict::new(&[("a", 3, 1)], &[]);
        assert!(!a.tiles_same(&b));
    }
}
