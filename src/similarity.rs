//! Lexical similarity built on longest common matching blocks
//! (Ratcliff/Obershelp). Once the second sequence reaches
//! [`POPULAR_MIN_LEN`] elements, any element occurring in more than 1% of it
//! stops seeding matches, though matches may still extend across it.

use std::collections::HashMap;
use std::hash::Hash;
use std::mem;

/// Length of `b` at which popular elements are pruned from match seeding.
pub const POPULAR_MIN_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchingBlock {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

/// Non-overlapping blocks common to `a` and `b`, ordered by position.
/// Found by taking the longest common run, then recursing on both sides.
pub fn matching_blocks<T: Eq + Hash>(a: &[T], b: &[T]) -> Vec<MatchingBlock> {
    let mut matcher = Matcher::new(a, b);
    let mut pending = vec![(0, a.len(), 0, b.len())];
    let mut blocks = Vec::new();

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let found = matcher.find_longest_match(alo, ahi, blo, bhi);
        if found.size == 0 {
            continue;
        }

        if alo < found.a && blo < found.b {
            pending.push((alo, found.a, blo, found.b));
        }
        if found.a + found.size < ahi && found.b + found.size < bhi {
            pending.push((found.a + found.size, ahi, found.b + found.size, bhi));
        }
        blocks.push(found);
    }

    blocks.sort();
    coalesce(blocks)
}

struct Matcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    /// Positions in `b` of every element allowed to seed a match.
    b2j: HashMap<&'a T, Vec<usize>>,
    // Run lengths indexed by `j + 1`, so slot `j` holds the run ending at `j - 1`.
    previous: Vec<usize>,
    current: Vec<usize>,
    previous_touched: Vec<usize>,
    current_touched: Vec<usize>,
}

impl<'a, T: Eq + Hash> Matcher<'a, T> {
    fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }

        if b.len() >= POPULAR_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }

        Self {
            a,
            b,
            b2j,
            previous: vec![0; b.len() + 1],
            current: vec![0; b.len() + 1],
            previous_touched: Vec::new(),
            current_touched: Vec::new(),
        }
    }

    /// Longest run of `a[alo..ahi]` in `b[blo..bhi]`, earliest in `a` then in
    /// `b` on ties, extended over neighbouring equal elements.
    fn find_longest_match(
        &mut self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> MatchingBlock {
        let mut best = MatchingBlock {
            a: alo,
            b: blo,
            size: 0,
        };

        for i in alo..ahi {
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let run = self.previous[j] + 1;
                    self.current[j + 1] = run;
                    self.current_touched.push(j + 1);
                    if run > best.size {
                        best = MatchingBlock {
                            a: i + 1 - run,
                            b: j + 1 - run,
                            size: run,
                        };
                    }
                }
            }
            self.advance_row();
        }
        self.advance_row();

        while best.a > alo && best.b > blo && self.a[best.a - 1] == self.b[best.b - 1] {
            best.a -= 1;
            best.b -= 1;
            best.size += 1;
        }
        while best.a + best.size < ahi
            && best.b + best.size < bhi
            && self.a[best.a + best.size] == self.b[best.b + best.size]
        {
            best.size += 1;
        }

        best
    }

    /// Clears the finished row and makes the row just built the previous one.
    fn advance_row(&mut self) {
        for &slot in &self.previous_touched {
            self.previous[slot] = 0;
        }
        self.previous_touched.clear();
        mem::swap(&mut self.previous, &mut self.current);
        mem::swap(&mut self.previous_touched, &mut self.current_touched);
    }
}

fn coalesce(blocks: Vec<MatchingBlock>) -> Vec<MatchingBlock> {
    let mut merged: Vec<MatchingBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if let Some(last) = merged.last_mut() {
            if last.a + last.size == block.a && last.b + last.size == block.b {
                last.size += block.size;
                continue;
            }
        }
        merged.push(block);
    }
    merged
}

/// `2 * matched / (len(a) + len(b))` over characters; 1.0 when both are empty.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a_chars = a.chars().collect::<Vec<char>>();
    let b_chars = b.chars().collect::<Vec<char>>();
    let total = a_chars.len() + b_chars.len();
    if total == 0 {
        return 1.0;
    }

    let matched: usize = matching_blocks(&a_chars, &b_chars)
        .iter()
        .map(|block| block.size)
        .sum();
    2.0 * matched as f64 / total as f64
}

/// Lines of `revised` that a line diff against `original` would mark as
/// added, in order.
pub fn introduced_lines<'a>(original: &str, revised: &'a str) -> Vec<&'a str> {
    let original_lines = original.lines().collect::<Vec<&str>>();
    let revised_lines = revised.lines().collect::<Vec<&str>>();

    let mut covered = vec![false; revised_lines.len()];
    for block in matching_blocks(&original_lines, &revised_lines) {
        for slot in &mut covered[block.b..block.b + block.size] {
            *slot = true;
        }
    }

    revised_lines
        .into_iter()
        .zip(covered)
        .filter_map(|(line, is_covered)| (!is_covered).then_some(line))
        .collect()
}
