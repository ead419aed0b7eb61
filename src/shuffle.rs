use rand::seq::SliceRandom;
use rand::Rng;

/// Return a uniformly random permutation of `items`, leaving the input as is.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    // Fisher-Yates.
    out.shuffle(rng);
    out
}
