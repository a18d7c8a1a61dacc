use std::num::NonZeroUsize;
use std::ops::Range;

/// Contiguous chunks of at most `size` items, in input order. The iterator
/// only holds a cursor, so cloning it restarts from the same position.
pub fn batches<T>(items: &[T], size: NonZeroUsize) -> Batches<'_, T> {
    Batches {
        items,
        size: size.get(),
        cursor: 0,
    }
}

#[derive(Debug, Clone)]
pub struct Batches<'a, T> {
    items: &'a [T],
    size: usize,
    cursor: usize,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        let range = next_range(self.cursor, self.size, self.items.len())?;
        self.cursor = range.end;
        Some(&self.items[range])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.items.len() - self.cursor).div_ceil(self.size);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Batches<'_, T> {}

fn next_range(cursor: usize, size: usize, len: usize) -> Option<Range<usize>> {
    (cursor < len).then(|| cursor..(cursor + size).min(len))
}

/// Like [`batches`], but a run of consecutive items sharing a key is never
/// split across two chunks. A run longer than `size` becomes its own chunk.
pub fn batches_by_key<T, K, F>(items: &[T], size: NonZeroUsize, key: F) -> KeyedBatches<'_, T, F>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    KeyedBatches {
        items,
        size: size.get(),
        cursor: 0,
        key,
    }
}

#[derive(Debug, Clone)]
pub struct KeyedBatches<'a, T, F> {
    items: &'a [T],
    size: usize,
    cursor: usize,
    key: F,
}

impl<'a, T, K, F> Iterator for KeyedBatches<'a, T, F>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor;
        if start >= self.items.len() {
            return None;
        }

        let mut end = self.run_end(start);
        while end < self.items.len() {
            let next_end = self.run_end(end);
            if next_end - start > self.size {
                break;
            }
            end = next_end;
        }

        self.cursor = end;
        Some(&self.items[start..end])
    }
}

impl<T, K, F> KeyedBatches<'_, T, F>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    fn run_end(&self, start: usize) -> usize {
        let first = (self.key)(&self.items[start]);
        self.items[start..]
            .iter()
            .position(|item| (self.key)(item) != first)
            .map_or(self.items.len(), |offset| start + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn batches_cover_input_in_order() {
        for len in [0_usize, 1, 4, 5, 6, 17] {
            for chunk in [1_usize, 2, 5, 100] {
                let items: Vec<usize> = (0..len).collect();
                let chunks: Vec<&[usize]> = batches(&items, size(chunk)).collect();

                assert_eq!(chunks.len(), len.div_ceil(chunk), "len={len} chunk={chunk}");
                if let Some((last, full)) = chunks.split_last() {
                    assert!(full.iter().all(|c| c.len() == chunk));
                    assert!(!last.is_empty() && last.len() <= chunk);
                }
                assert_eq!(chunks.concat(), items);
            }
        }
    }

    #[test]
    fn batches_restart_from_a_clone() {
        let items = [1, 2, 3, 4, 5];
        let mut iter = batches(&items, size(2));
        iter.next();

        let rest: Vec<&[i32]> = iter.clone().collect();
        assert_eq!(rest, vec![&[3, 4][..], &[5][..]]);
        assert_eq!(iter.len(), 2);
    }

    #[test]
    fn keyed_batches_keep_runs_together() {
        let items = [(1, 'a'), (1, 'b'), (2, 'a'), (2, 'b'), (2, 'c'), (3, 'a')];
        let chunks: Vec<Vec<i32>> = batches_by_key(&items, size(3), |item| item.0)
            .map(|chunk| chunk.iter().map(|item| item.0).collect())
            .collect();

        assert_eq!(chunks, vec![vec![1, 1], vec![2, 2, 2], vec![3]]);
    }

    #[test]
    fn keyed_batches_give_oversized_runs_their_own_chunk() {
        let items = [1, 2, 2, 2, 2, 3, 4];
        let chunks: Vec<&[i32]> = batches_by_key(&items, size(2), |item| *item).collect();

        assert_eq!(chunks, vec![&[1][..], &[2, 2, 2, 2][..], &[3, 4][..]]);
        assert_eq!(chunks.concat(), items);
    }
}
