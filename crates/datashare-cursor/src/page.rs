use serde::{Deserialize, Serialize};

use crate::error::{CursorError, Result};

/// The `(page_number, count_per_page)` pair bounding what is serialized.
///
/// Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub page_number: i32,
    pub count_per_page: i32,
}

impl PageWindow {
    /// Validated page window.
    pub fn new(page_number: i32, count_per_page: i32) -> Result<Self> {
        let window = Self {
            page_number,
            count_per_page,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_number < 1 {
            return Err(CursorError::invalid(format!(
                "page number must be >= 1, got {}",
                self.page_number
            )));
        }
        if self.count_per_page < 1 {
            return Err(CursorError::invalid(format!(
                "count per page must be >= 1, got {}",
                self.count_per_page
            )));
        }
        Ok(())
    }

    /// Number of items skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.page_number as u64 - 1) * self.count_per_page as u64
    }

    /// Number of items this page holds out of `total`.
    pub fn len_of(&self, total: u64) -> u64 {
        total
            .saturating_sub(self.offset())
            .min(self.count_per_page as u64)
    }

    /// Whether the 1-based `ordinal` falls inside this page.
    pub fn contains(&self, ordinal: u64) -> bool {
        ordinal > self.offset() && ordinal <= self.offset() + self.count_per_page as u64
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page_number: 1,
            count_per_page: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_values() {
        assert!(PageWindow::new(0, 10).is_err());
        assert!(PageWindow::new(1, 0).is_err());
        assert!(PageWindow::new(-3, 10).is_err());
    }

    #[test]
    fn pages_of_forty_five_by_twenty() {
        let total = 45;
        assert_eq!(PageWindow::new(1, 20).unwrap().len_of(total), 20);
        assert_eq!(PageWindow::new(2, 20).unwrap().len_of(total), 20);
        assert_eq!(PageWindow::new(3, 20).unwrap().len_of(total), 5);
        assert_eq!(PageWindow::new(4, 20).unwrap().len_of(total), 0);
    }

    #[test]
    fn contains_is_half_open_from_offset() {
        let window = PageWindow::new(2, 3).unwrap();
        assert_eq!(window.offset(), 3);
        assert!(!window.contains(3));
        assert!(window.contains(4));
        assert!(window.contains(6));
        assert!(!window.contains(7));
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        let window = PageWindow::new(i32::MAX, i32::MAX).unwrap();
        assert_eq!(window.len_of(10), 0);
    }
}
