/// Fixed-capacity ring buffer holding the still-outstanding operations of one queue.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
  buffer: Vec<Option<T>>,
  head: usize, // oldest
  tail: usize, // next free slot
  size: usize,
  capacity: usize,
}

impl<T> RingBuffer<T> {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      buffer: std::iter::repeat_with(|| None).take(capacity).collect(),
      head: 0,
      tail: 0,
      size: 0,
      capacity,
    }
  }

  /// Appends `item`, returning false when the buffer is full.
  pub fn push(&mut self, item: T) -> bool {
    if self.is_full() {
      return false;
    }

    self.buffer[self.tail] = Some(item);
    self.tail = (self.tail + 1) % self.capacity;
    self.size += 1;
    true
  }

  /// Appends `item`, dropping the oldest entry first when full.
  pub fn push_evict(&mut self, item: T) -> Option<T> {
    let evicted = if self.is_full() { self.pop() } else { None };
    self.push(item);
    evicted
  }

  /// Removes the oldest entry.
  pub fn pop(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }

    let item = self.buffer[self.head].take();
    self.head = (self.head + 1) % self.capacity;
    self.size -= 1;
    item
  }

  /// Oldest entry, without removing it.
  pub fn peek(&self) -> Option<&T> {
    if self.is_empty() {
      None
    } else {
      self.buffer[self.head].as_ref()
    }
  }

  /// Entry `distance` steps back from the most recent push (0 is the newest).
  pub fn newest(&self, distance: usize) -> Option<&T> {
    if distance >= self.size {
      return None;
    }
    let slot = (self.tail + self.capacity - 1 - distance) % self.capacity;
    self.buffer[slot].as_ref()
  }

  /// Walks from the newest entry to the oldest.
  pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
    (0..self.size).filter_map(move |distance| self.newest(distance))
  }

  /// Drops the entry at `distance` from the newest and everything older.
  pub fn retire_from(&mut self, distance: usize) {
    while self.size > distance {
      self.pop();
    }
  }

  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  pub fn is_full(&self) -> bool {
    self.size == self.capacity
  }

  pub fn len(&self) -> usize {
    self.size
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ring_buffer() {
    let mut rb = RingBuffer::new(4);
    assert!(rb.is_empty());

    assert!(rb.push(24));
    assert!(rb.push(25));
    assert_eq!(rb.len(), 2);

    assert_eq!(rb.pop(), Some(24));
    assert_eq!(rb.len(), 1);
    assert_eq!(rb.peek(), Some(&25));
  }

  #[test]
  fn test_push_evict_drops_oldest() {
    let mut rb = RingBuffer::new(2);
    assert_eq!(rb.push_evict(1), None);
    assert_eq!(rb.push_evict(2), None);
    assert!(!rb.push(3));
    assert_eq!(rb.push_evict(3), Some(1));
    assert_eq!(rb.iter_newest_first().copied().collect::<Vec<_>>(), vec![3, 2]);
  }

  #[test]
  fn test_retire_from() {
    let mut rb = RingBuffer::new(3);
    for i in 0..3 {
      rb.push(i);
    }
    assert_eq!(rb.newest(0), Some(&2));
    assert_eq!(rb.newest(2), Some(&0));
    assert_eq!(rb.newest(3), None);

    rb.retire_from(1);
    assert_eq!(rb.len(), 1);
    assert_eq!(rb.peek(), Some(&2));

    rb.retire_from(0);
    assert!(rb.is_empty());
  }
}
