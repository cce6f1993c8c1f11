use rand::Rng;

/// Pick `count` items uniformly at random.
///
/// Shuffles a full copy of `items` (Fisher-Yates, walking from the last
/// index down to 1) and keeps the first `count`. This costs O(len) even for
/// a small `count`; the widget runs the same loop, and both sides are meant
/// to stay that simple.
pub fn select_random<T: Clone, R: Rng + ?Sized>(items: &[T], count: usize, rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();

    for i in (1..shuffled.len()).rev() {
        let j = rng.gen_range(0..=i);
        shuffled.swap(i, j);
    }

    shuffled.truncate(count.min(items.len()));
    shuffled
}
