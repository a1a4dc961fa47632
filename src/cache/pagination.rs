//! Page slicing for record batches

/// One page of a batch plus the counts the UI needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Items reachable through paging (`min(len, max_pages * page_size)`)
    pub total_items: usize,
    pub real_max_pages: usize,
}

/// Slices `items` into the 1-based `page`
///
/// Pages past the end yield an empty slice; callers clamp `page` if they need
/// a valid page. A zero `page_size` is treated as an empty page.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize, max_pages: usize) -> Page<T> {
    if page_size == 0 {
        return Page {
            items: Vec::new(),
            total_items: 0,
            real_max_pages: 1,
        };
    }

    let total_items = items.len().min(max_pages.saturating_mul(page_size));
    let real_max_pages = max_pages.min(total_items.div_ceil(page_size)).max(1);

    let page_items = if page == 0 || page > real_max_pages {
        Vec::new()
    } else {
        let start = (page - 1) * page_size;
        let end = (page * page_size).min(total_items);
        if start >= end {
            Vec::new()
        } else {
            items[start..end].to_vec()
        }
    };

    Page {
        items: page_items,
        total_items,
        real_max_pages,
    }
}
