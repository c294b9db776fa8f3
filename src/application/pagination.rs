//! Offset pagination over ordered feeds.
//!
//! Page numbers are 1-based. Resolution follows a clamping policy: a missing
//! or non-numeric request selects the first page, any numeric request outside
//! `1..=num_pages` selects the last page. An empty sequence still has one
//! (empty) page.

use serde::Serialize;

/// Fixed number of posts shown on every feed page.
pub const POSTS_PER_PAGE: u32 = 10;

/// The slice of an ordered sequence a page covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub offset: u64,
    pub limit: u32,
}

/// Splits `total_count` ordered items into pages of `per_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    total_count: u64,
    per_page: u32,
}

impl Paginator {
    pub fn new(total_count: u64, per_page: u32) -> Self {
        Self {
            total_count,
            per_page: per_page.max(1),
        }
    }

    /// Paginator using the global feed page size.
    pub fn for_posts(total_count: u64) -> Self {
        Self::new(total_count, POSTS_PER_PAGE)
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn num_pages(&self) -> u32 {
        if self.total_count == 0 {
            return 1;
        }
        let pages = self.total_count.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Resolve a raw `page` query value to a valid page number.
    pub fn resolve(&self, requested: Option<&str>) -> u32 {
        let Some(raw) = requested else {
            return 1;
        };

        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(number) if number >= 1 && number <= i64::from(self.num_pages()) => {
                // Range checked above.
                number as u32
            }
            Ok(_) => self.num_pages(),
            Err(_) if is_integer_literal(raw) => self.num_pages(),
            Err(_) => 1,
        }
    }

    /// Window for the page resolved from `requested`.
    pub fn window(&self, requested: Option<&str>) -> PageWindow {
        let number = self.resolve(requested);
        PageWindow {
            number,
            offset: u64::from(number - 1) * u64::from(self.per_page),
            limit: self.per_page,
        }
    }
}

/// Digits with an optional sign, of any magnitude.
fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

/// One page of an ordered sequence plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, paginator: &Paginator) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: paginator.num_pages(),
            total_count: paginator.total_count(),
        }
    }

    /// Slice an in-memory ordered sequence.
    #[cfg(test)]
    pub(crate) fn from_sequence(items: Vec<T>, per_page: u32, requested: Option<&str>) -> Self {
        let paginator = Paginator::new(items.len() as u64, per_page);
        let window = paginator.window(requested);
        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let page_items = items
            .into_iter()
            .skip(offset)
            .take(window.limit as usize)
            .collect();
        Self::new(page_items, window, &paginator)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn next_number(&self) -> Option<u32> {
        self.has_next().then_some(self.number + 1)
    }

    pub fn previous_number(&self) -> Option<u32> {
        self.has_previous().then_some(self.number - 1)
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        (1..=self.num_pages).collect()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}
