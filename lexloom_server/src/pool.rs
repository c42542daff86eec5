// The shared bag of undrawn tiles.
//
// Every device in a game keeps its own `TilePool`, and the protocol keeps
// them identical as multisets: whoever draws sends the exact tiles drawn,
// and every other device removes those same tiles from its copy. Draw
// order is random per device (seeded, so tests can be deterministic), but
// the contents never diverge. A trade returns the surrendered tiles after
// the replacement draw so a player cannot draw back what they just gave
// up.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use tracing::debug;

use lexloom_protocol::types::Tile;
use lexloom_protocol::wire::{WireError, WireReader, WireWriter};

use crate::dict::Dictionary;

/// Most tiles any tray holds; also the largest single draw.
pub const MAX_TRAY_TILES: usize = 7;

/// A handful of tiles: a tray, a draw, or a trade.
pub type TileSet = SmallVec<[Tile; MAX_TRAY_TILES]>;

pub struct TilePool {
    /// Undrawn count per face, indexed by `Tile`.
    counts: Vec<u8>,
    n_left: u16,
    rng: StdRng,
}

impl TilePool {
    /// A full pool holding every tile the dictionary defines.
    pub fn from_dict(dict: &dyn Dictionary, seed: u64) -> TilePool {
        let n_faces = usize::from(dict.n_faces());
        let mut counts = Vec::with_capacity(n_faces);
        let mut n_left = 0u16;
        for face in 0..n_faces {
            #[expect(clippy::cast_possible_truncation)]
            let count = dict.count_for(Tile(face as u8));
            counts.push(count);
            n_left += u16::from(count);
        }
        debug!(n_faces, n_left, "pool initialized");
        TilePool {
            counts,
            n_left,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn n_left(&self) -> u16 {
        self.n_left
    }

    pub fn n_left_for(&self, tile: Tile) -> u8 {
        self.counts.get(usize::from(tile.0)).copied().unwrap_or(0)
    }

    /// Draw up to `n` tiles at random, weighted by remaining counts. Fewer
    /// come back when the pool runs dry mid-draw.
    pub fn request_tiles(&mut self, n: usize) -> TileSet {
        let mut drawn = TileSet::new();
        for _ in 0..n {
            let Some(tile) = self.draw_one() else {
                break;
            };
            drawn.push(tile);
        }
        drawn
    }

    fn draw_one(&mut self) -> Option<Tile> {
        if self.n_left == 0 {
            return None;
        }
        let mut target = self.rng.random_range(0..self.n_left);
        for (face, count) in self.counts.iter_mut().enumerate() {
            let count16 = u16::from(*count);
            if target < count16 {
                *count -= 1;
                self.n_left -= 1;
                #[expect(clippy::cast_possible_truncation)]
                return Some(Tile(face as u8));
            }
            target -= count16;
        }
        debug_assert!(false, "counts out of sync with n_left");
        None
    }

    /// True when `tile` names a face this pool tracks. Tiles arriving off
    /// the wire must pass here before they touch the counts.
    pub fn tile_known(&self, tile: Tile) -> bool {
        usize::from(tile.0) < self.counts.len()
    }

    pub fn tiles_known(&self, tiles: &[Tile]) -> bool {
        tiles.iter().all(|tile| self.tile_known(*tile))
    }

    /// Remove these exact tiles: another device drew them, so they are
    /// spoken for here too. A batch naming an unknown face is refused
    /// whole, leaving the counts untouched.
    pub fn remove_tiles(&mut self, tiles: &[Tile]) -> bool {
        if !self.tiles_known(tiles) {
            return false;
        }
        for tile in tiles {
            let count = &mut self.counts[usize::from(tile.0)];
            debug_assert!(*count > 0, "removing a tile the pool does not hold");
            if *count > 0 {
                *count -= 1;
                self.n_left -= 1;
            }
        }
        true
    }

    /// Return traded tiles to circulation. A batch naming an unknown face
    /// or pushing a count past its range is refused whole.
    pub fn replace_tiles(&mut self, tiles: &[Tile]) -> bool {
        let mut counts = self.counts.clone();
        let mut n_back = 0u16;
        for tile in tiles {
            let Some(count) = counts.get_mut(usize::from(tile.0)) else {
                return false;
            };
            let Some(bumped) = count.checked_add(1) else {
                return false;
            };
            *count = bumped;
            n_back += 1;
        }
        self.counts = counts;
        self.n_left += n_back;
        true
    }

    pub fn write(&self, w: &mut WireWriter) {
        w.put_u16(self.n_left);
        debug_assert!(self.counts.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.counts.len() as u8);
        for count in &self.counts {
            w.put_u8(*count);
        }
    }

    /// The draw sequence is not part of the saved state; a restored pool
    /// reseeds.
    pub fn read(r: &mut WireReader<'_>, seed: u64) -> Result<TilePool, WireError> {
        let n_left = r.u16()?;
        let n_faces = r.u8()?;
        let mut counts = Vec::with_capacity(usize::from(n_faces));
        for _ in 0..n_faces {
            counts.push(r.u8()?);
        }
        Ok(TilePool {
            counts,
            n_left,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::tests::WordListDict;

    fn small_dict() -> WordListDict {
        // Faces a/b/c with counts 4/3/2, values 1/2/3.
        WordListDict::new(
            &[("a", 4, 1), ("b", 3, 2), ("c", 2, 3)],
            &["ab", "cab"],
        )
    }

    #[test]
    fn draws_exactly_the_pool_contents() {
        let dict = small_dict();
        let mut pool = TilePool::from_dict(&dict, 7);
        assert_eq!(pool.n_left(), 9);

        let mut tally = [0u8; 3];
        let drawn = pool.request_tiles(20);
        assert_eq!(drawn.len(), 9);
        for tile in &drawn {
            tally[usize::from(tile.0)] += 1;
        }
        assert_eq!(tally, [4, 3, 2]);
        assert_eq!(pool.n_left(), 0);
    }

    #[test]
    fn same_seed_same_draws() {
        let dict = small_dict();
        let mut a = TilePool::from_dict(&dict, 42);
        let mut b = TilePool::from_dict(&dict, 42);
        assert_eq!(a.request_tiles(9), b.request_tiles(9));
    }

    #[test]
    fn remove_and_replace_mirror_each_other() {
        let dict = small_dict();
        let mut pool = TilePool::from_dict(&dict, 1);
        assert!(pool.remove_tiles(&[Tile(0), Tile(0), Tile(2)]));
        assert_eq!(pool.n_left(), 6);
        assert_eq!(pool.n_left_for(Tile(0)), 2);
        assert_eq!(pool.n_left_for(Tile(2)), 1);

        assert!(pool.replace_tiles(&[Tile(0), Tile(2)]));
        assert_eq!(pool.n_left(), 8);
        assert_eq!(pool.n_left_for(Tile(0)), 3);
    }

    #[test]
    fn unknown_faces_are_refused_whole() {
        let dict = small_dict();
        let mut pool = TilePool::from_dict(&dict, 3);

        // One good face, one the dictionary never defined: nothing moves.
        assert!(!pool.remove_tiles(&[Tile(0), Tile(200)]));
        assert_eq!(pool.n_left(), 9);
        assert_eq!(pool.n_left_for(Tile(0)), 4);

        assert!(!pool.replace_tiles(&[Tile(0), Tile(200)]));
        assert_eq!(pool.n_left(), 9);
        assert_eq!(pool.n_left_for(Tile(0)), 4);
    }

    #[test]
    fn replace_never_overflows_a_count() {
        let dict = small_dict();
        let mut pool = TilePool::from_dict(&dict, 3);

        let flood = vec![Tile(0); 300];
        assert!(!pool.replace_tiles(&flood));
        assert_eq!(pool.n_left_for(Tile(0)), 4);
        assert_eq!(pool.n_left(), 9);
    }

    #[test]
    fn wire_roundtrip_preserves_counts() {
        let dict = small_dict();
        let mut pool = TilePool::from_dict(&dict, 9);
        pool.remove_tiles(&[Tile(1)]);

        let mut w = WireWriter::new();
        pool.write(&mut w);
        let buf = w.finish();

        let mut r = WireReader::new(&buf);
        let restored = TilePool::read(&mut r, 9).unwrap();
        assert_eq!(restored.n_left(), pool.n_left());
        for face in 0..3 {
            assert_eq!(restored.n_left_for(Tile(face)), pool.n_left_for(Tile(face)));
        }
    }
}
