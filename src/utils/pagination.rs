use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One page of an in-memory list. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Slice out `page`, clamping it into `[1, total_pages]` when any pages exist.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = (total_items + page_size - 1) / page_size;
    let page = page.max(1).min(total_pages.max(1));

    let start = (page - 1) * page_size;
    let items = items.iter().skip(start).take(page_size).cloned().collect();

    Page {
        items,
        page,
        page_size,
        total_items,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginates_and_counts_pages() {
        let items: Vec<u32> = (1..=25).collect();
        let page = paginate(&items, 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 25);
    }

    #[test]
    fn test_clamps_out_of_range_page() {
        let items: Vec<u32> = (1..=12).collect();
        assert_eq!(paginate(&items, 9, 10).page, 2);
        assert_eq!(paginate(&items, 0, 10).page, 1);
    }

    #[test]
    fn test_empty_list() {
        let page = paginate::<u32>(&[], 4, DEFAULT_PAGE_SIZE);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }
}
