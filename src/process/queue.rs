/*!
 * Ready-Queue Set
 *
 * Three circular windows (L0..L2) over the process table. Membership is
 * implicit in each descriptor's (state, queue) fields; a window only bounds
 * how far a scan has to look. Empty means front == back.
 */

use super::types::Level;

/// Front/back cursors of one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub front: usize,
    pub back: usize,
}

impl Window {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.front == self.back
    }

    /// Whether `idx` lies in the circular range [front, back)
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        if self.front <= self.back {
            self.front <= idx && idx < self.back
        } else {
            idx >= self.front || idx < self.back
        }
    }
}

/// Per-level circular windows over a table of `len` slots
#[derive(Debug, Clone)]
pub struct ReadyQueues {
    windows: [Window; 3],
    len: usize,
}

/// True iff `x` lies strictly between `front` and `back` in circular order
#[inline]
fn strictly_between(front: usize, x: usize, back: usize) -> bool {
    (front < x && x < back) || (x < back && back < front) || (back < front && front < x)
}

#[inline]
fn slot(level: Level) -> usize {
    match level {
        Level::L0 => 0,
        Level::L1 => 1,
        Level::L2 => 2,
        Level::Special => panic!("escape level has no ready queue"),
    }
}

impl ReadyQueues {
    pub fn new(len: usize) -> Self {
        Self {
            windows: [Window::default(); 3],
            len,
        }
    }

    /// Slot after `idx`, wrapping at the table end
    #[inline]
    pub fn next(&self, idx: usize) -> usize {
        (idx + 1) % self.len
    }

    #[inline]
    pub fn window(&self, level: Level) -> Window {
        self.windows[slot(level)]
    }

    #[inline]
    pub fn front(&self, level: Level) -> usize {
        self.windows[slot(level)].front
    }

    #[inline]
    pub fn back(&self, level: Level) -> usize {
        self.windows[slot(level)].back
    }

    #[inline]
    pub fn set_front(&mut self, level: Level, idx: usize) {
        self.windows[slot(level)].front = idx;
    }

    #[inline]
    pub fn set_back(&mut self, level: Level, idx: usize) {
        self.windows[slot(level)].back = idx;
    }

    #[inline]
    pub fn is_empty(&self, level: Level) -> bool {
        self.windows[slot(level)].is_empty()
    }

    /// Find the first candidate of `level` and move front onto it
    ///
    /// Scans [front, back) first, then one full circle starting at back to
    /// catch candidates the window lags behind. Returns `None` only when no
    /// slot in the table qualifies; the level is then left empty.
    pub fn first_runnable(
        &mut self,
        level: Level,
        is_candidate: impl Fn(usize) -> bool,
    ) -> Option<usize> {
        let s = slot(level);
        let Window { front, back } = self.windows[s];

        let mut idx = front;
        while idx != back {
            if is_candidate(idx) {
                self.windows[s].front = idx;
                return Some(idx);
            }
            idx = self.next(idx);
        }

        let mut idx = back;
        loop {
            if is_candidate(idx) {
                let next = self.next(idx);
                let window = &mut self.windows[s];
                window.front = idx;
                if window.back == idx {
                    window.back = next;
                }
                return Some(idx);
            }
            idx = self.next(idx);
            if idx == back {
                break;
            }
        }

        self.windows[s].front = back;
        None
    }

    /// Make slot `p`, just placed at `level`, discoverable by scans
    ///
    /// Inside the window nothing changes; otherwise back advances to just
    /// past `p`. A `p` immediately before front pulls front back instead, so
    /// the window never collapses. A window already spanning every other
    /// slot cannot grow; `p` is then left to the second scan pass.
    pub fn extend_back(&mut self, level: Level, p: usize) {
        let next = self.next(p);
        let window = &mut self.windows[slot(level)];

        if window.is_empty() {
            window.front = p;
            window.back = next;
            return;
        }
        if strictly_between(window.front, next, window.back) {
            return;
        }
        if next == window.front {
            if window.back != p {
                window.front = p;
            }
            return;
        }
        window.back = next;
    }

    /// Put `p` at the front of `level` so it is picked next
    ///
    /// When `p` sits on the back cursor the front cannot move onto it without
    /// emptying the window; the back is extended over `p` instead.
    pub fn push_front(&mut self, level: Level, p: usize) {
        let window = self.windows[slot(level)];
        if window.is_empty() || p == window.back {
            self.extend_back(level, p);
            return;
        }
        self.windows[slot(level)].front = p;
    }
}
