//! Fixed capacity ordered list of small copyable items
//!
//! The command queues keep indices of pool slots rather than the commands themselves. Order is
//! decided by the caller: items are appended, prepended or inserted after a given item.

/// Errors reported by [`SlotList`]
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// The list has no room for another item
    Full,
    /// The anchor item is not in the list
    NotFound,
}

/// Ordered list holding at most `N` items
///
/// # Example
///
/// ```
/// use rf_multimode::utils::slot_list::SlotList;
///
/// let mut list = SlotList::<u8, 4>::new();
/// list.push_back(1).unwrap();
/// list.push_back(3).unwrap();
/// list.insert_after(1, 2).unwrap();
///
/// assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
/// assert_eq!(list.pop_front(), Some(1));
/// ```
#[derive(Debug)]
pub struct SlotList<T: Copy + PartialEq, const N: usize> {
    items: [Option<T>; N],
    len: usize,
}

impl<T: Copy + PartialEq, const N: usize> SlotList<T, N> {
    /// Creates an empty list
    pub const fn new() -> Self {
        Self {
            items: [None; N],
            len: 0,
        }
    }

    /// Number of items in the list
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no items
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First item, if any
    pub fn head(&self) -> Option<T> {
        self.items[0]
    }

    /// Last item, if any
    pub fn tail(&self) -> Option<T> {
        match self.len {
            0 => None,
            len => self.items[len - 1],
        }
    }

    /// Iterates over the items from head to tail
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items[..self.len].iter().filter_map(|item| *item)
    }

    /// Position of `item` counted from the head
    pub fn position(&self, item: T) -> Option<usize> {
        self.iter().position(|i| i == item)
    }

    /// Whether `item` is in the list
    pub fn contains(&self, item: T) -> bool {
        self.position(item).is_some()
    }

    /// Item following `item`, if both exist
    pub fn next_after(&self, item: T) -> Option<T> {
        let pos = self.position(item)?;
        self.items.get(pos + 1).copied().flatten()
    }

    /// Appends `item` at the tail
    pub fn push_back(&mut self, item: T) -> Result<(), Error> {
        self.insert_at(self.len, item)
    }

    /// Prepends `item` at the head
    pub fn push_front(&mut self, item: T) -> Result<(), Error> {
        self.insert_at(0, item)
    }

    /// Inserts `item` directly after `anchor`
    pub fn insert_after(&mut self, anchor: T, item: T) -> Result<(), Error> {
        let pos = self.position(anchor).ok_or(Error::NotFound)?;
        self.insert_at(pos + 1, item)
    }

    /// Removes and returns the head item
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head()?;
        self.remove_at(0);
        Some(head)
    }

    /// Removes `item` from the list, returning whether it was present
    pub fn remove(&mut self, item: T) -> bool {
        match self.position(item) {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    /// Removes all items
    pub fn clear(&mut self) {
        self.items = [None; N];
        self.len = 0;
    }

    fn insert_at(&mut self, pos: usize, item: T) -> Result<(), Error> {
        if self.len == N {
            return Err(Error::Full);
        }
        self.items[pos..=self.len].rotate_right(1);
        self.items[pos] = Some(item);
        self.len += 1;
        Ok(())
    }

    fn remove_at(&mut self, pos: usize) {
        self.items[pos..self.len].rotate_left(1);
        self.len -= 1;
        self.items[self.len] = None;
    }
}

impl<T: Copy + PartialEq, const N: usize> Default for SlotList<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        let mut list = SlotList::<u8, 3>::new();
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);
        assert_eq!(list.pop_front(), None);
        assert!(!list.remove(1));
    }

    #[test]
    fn test_fifo_order() {
        let mut list = SlotList::<u8, 3>::new();
        list.push_back(7).unwrap();
        list.push_back(8).unwrap();
        list.push_front(6).unwrap();

        assert_eq!(list.head(), Some(6));
        assert_eq!(list.tail(), Some(8));
        assert_eq!(list.pop_front(), Some(6));
        assert_eq!(list.pop_front(), Some(7));
        assert_eq!(list.pop_front(), Some(8));
        assert!(list.is_empty());
    }

    #[test]
    fn test_full_list_rejects_items() {
        let mut list = SlotList::<u8, 2>::new();
        list.push_back(1).unwrap();
        list.push_back(2).unwrap();

        assert_eq!(list.push_back(3), Err(Error::Full));
        assert_eq!(list.insert_after(1, 3), Err(Error::Full));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_insert_after_and_remove() {
        let mut list = SlotList::<u8, 5>::new();
        list.push_back(1).unwrap();
        list.push_back(4).unwrap();
        list.insert_after(1, 2).unwrap();
        list.insert_after(4, 5).unwrap();
        assert_eq!(list.insert_after(9, 3), Err(Error::NotFound));

        assert_eq!(list.next_after(1), Some(2));
        assert_eq!(list.next_after(5), None);

        assert!(list.remove(4));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2, 5]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.tail(), Some(5));
    }
}
