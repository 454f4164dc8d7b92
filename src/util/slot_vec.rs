use std::fmt::{Debug, Formatter};

/// Elements that occupy a logical number of slots (eg. when used in a [`SlotVec`])
pub trait Width {
    fn width(&self) -> usize;
}

/// Offset into a [`SlotVec`] (or into a method's code array)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// A vector addressed by slot offset instead of element index.
///
/// An element's offset is the sum of the widths of the elements before it. The JVM class-file
/// format leans on this addressing scheme in several places:
///
///   - constant pool entries (`long` and `double` entries take two slots)
///   - local variables (`long` and `double` locals take two slots)
///
#[derive(Clone)]
pub struct SlotVec<T> {
    entries: Vec<(Offset, T)>,

    /// Offset at which the next element will be placed
    next_offset: Offset,

    /// Offset of the first element (0 for locals, 1 for the constant pool)
    base_offset: Offset,
}

impl<T: Width> SlotVec<T> {
    pub fn new() -> SlotVec<T> {
        SlotVec::starting_at(Offset(0))
    }

    pub fn starting_at(base_offset: Offset) -> SlotVec<T> {
        SlotVec {
            entries: vec![],
            next_offset: base_offset,
            base_offset,
        }
    }

    /// Number of elements (not slots)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset that the next pushed element would receive
    pub fn next_offset(&self) -> Offset {
        self.next_offset
    }

    /// Append an element, returning the offset it was placed at
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Look up an element by its offset
    ///
    /// Returns `None` for offsets that fall in the middle of a wide element (or past the end).
    pub fn get(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> {
        self.entries.iter().map(|(off, elem)| (*off, elem))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_offset = self.base_offset;
    }
}

impl<T: Width> Default for SlotVec<T> {
    fn default() -> SlotVec<T> {
        SlotVec::new()
    }
}

impl<T: Width> FromIterator<T> for SlotVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elems: I) -> SlotVec<T> {
        let mut slots = SlotVec::new();
        for elem in elems {
            slots.push(elem);
        }
        slots
    }
}

impl<T: Debug> Debug for SlotVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Narrow(_) => 1,
                Entry::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_account_for_widths() {
        let slots: SlotVec<Entry> = vec![
            Entry::Narrow(1),
            Entry::Wide(2),
            Entry::Narrow(3),
            Entry::Wide(4),
        ]
        .into_iter()
        .collect();

        let offsets: Vec<usize> = slots.iter().map(|(off, _)| off.0).collect();
        assert_eq!(offsets, vec![0, 1, 3, 4]);
        assert_eq!(slots.next_offset(), Offset(6));
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn base_offset_shifts_everything() {
        let mut slots: SlotVec<Entry> = SlotVec::starting_at(Offset(1));
        assert_eq!(slots.push(Entry::Wide(1)), Offset(1));
        assert_eq!(slots.push(Entry::Narrow(2)), Offset(3));
        assert_eq!(slots.next_offset(), Offset(4));
    }

    #[test]
    fn get_rejects_interior_offsets() {
        let mut slots: SlotVec<Entry> = SlotVec::new();
        slots.push(Entry::Wide(1));
        slots.push(Entry::Narrow(2));

        assert_eq!(slots.get(Offset(0)), Some(&Entry::Wide(1)));
        assert_eq!(slots.get(Offset(1)), None);
        assert_eq!(slots.get(Offset(2)), Some(&Entry::Narrow(2)));
        assert_eq!(slots.get(Offset(3)), None);
    }
}
