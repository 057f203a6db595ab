//! Generation-stamped arena of managed videos
//!
//! A [`VideoId`] stays valid until its entry is removed; the slot's
//! generation is bumped on removal so stale ids never resolve to a newer
//! video that reused the slot.

/// Handle to a registered video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VideoId {
    index: u32,
    generation: u32,
}

impl VideoId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> VideoId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return VideoId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        VideoId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: VideoId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: VideoId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, id: VideoId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Whether `id` was issued by this arena and has since been removed
    pub fn was_removed(&self, id: VideoId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation != id.generation)
    }

    /// Remove every entry, invalidating all outstanding ids
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                drained.push(value);
            }
        }
        self.len = 0;
        drained
    }

    pub fn iter(&self) -> impl Iterator<Item = (VideoId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    VideoId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_id_does_not_resolve_reused_slot() {
        let mut arena = Arena::default();
        let old = arena.insert("old");
        assert_eq!(arena.remove(old), Some("old"));

        let new = arena.insert("new");
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(arena.get(old), None);
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.get(new), Some(&"new"));
    }

    #[test]
    fn test_drain_invalidates_ids() {
        let mut arena = Arena::default();
        let a = arena.insert('a');
        let b = arena.insert('b');

        assert_eq!(arena.drain(), vec!['a', 'b']);
        assert_eq!(arena.len(), 0);
        assert!(arena.was_removed(a));
        assert!(arena.was_removed(b));

        let c = arena.insert('c');
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(c), Some(&'c'));
        assert!(!arena.was_removed(c));
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        arena.insert(2);
        arena.insert(3);
        arena.remove(a);

        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);
        assert_ne!(arena.len(), 0);
    }
}
