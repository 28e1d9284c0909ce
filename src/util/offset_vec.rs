use std::fmt::{Debug, Error, Formatter};
use std::slice::Iter;

/// Elements with a width (eg. when stored in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are the sum
/// of the widths of the preceding elements (not the number of preceding elements).
///
/// The constant pool is the motivating case: most entries have width 1, but `long` and `double`
/// entries occupy two indices and the slot after them is unusable.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector whose first element will sit at `initial_offset`
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
        }
    }

    /// Number of entries (not the offset length)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset at which the next element will be added
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back, returning its offset
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Look up an entry by offset
    ///
    /// Offsets landing in the middle of a wide element (or past the end) yield `None`.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|found_idx| &self.entries[found_idx].1)
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

/// Iterator for borrowed `OffsetVec`, yielding each element with its offset
pub struct OffsetVecIter<'a, T>(Iter<'a, (Offset, T)>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(off, elem)| (*off, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter())
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
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
    enum Slot {
        OneWide(u8),
        TwoWide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::OneWide(_) => 1,
                Slot::TwoWide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_skip_over_wide_slots() {
        let mut slots: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(0));
        for slot in &[
            Slot::OneWide(1),
            Slot::TwoWide(2),
            Slot::OneWide(3),
            Slot::TwoWide(4),
        ] {
            slots.push(*slot);
        }
        assert_eq!(
            slots.iter().map(|(off, slot)| (off, *slot)).collect::<Vec<_>>(),
            vec![
                (Offset(0), Slot::OneWide(1)),
                (Offset(1), Slot::TwoWide(2)),
                (Offset(3), Slot::OneWide(3)),
                (Offset(4), Slot::TwoWide(4)),
            ]
        );
        assert_eq!(slots.offset_len(), Offset(6));
    }

    #[test]
    fn lookup_by_offset() {
        let mut slots: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(1));
        slots.push(Slot::TwoWide(1));
        slots.push(Slot::OneWide(2));

        assert_eq!(slots.get_offset(Offset(1)), Some(&Slot::TwoWide(1)));
        assert_eq!(slots.get_offset(Offset(2)), None);
        assert_eq!(slots.get_offset(Offset(3)), Some(&Slot::OneWide(2)));
        assert_eq!(slots.get_offset(Offset(4)), None);
        assert_eq!(slots.get_offset(Offset(0)), None);
    }
}
