//! Minimal immutable list-based primitives.
//!
//! [`PersistentStack`] is a cons list with `Arc`-shared tails;
//! [`PersistentQueue`] is the classic two-stack FIFO queue built on it.
//! Both are building blocks for the larger structures in this module and
//! are useful on their own for cheap versioned LIFO/FIFO state.

use std::fmt;
use std::sync::Arc;

// =============================================================================
// PersistentStack
// =============================================================================

struct StackNode<T> {
    element: T,
    next: Option<Arc<StackNode<T>>>,
}

/// An immutable LIFO stack with structural sharing.
///
/// `push` and `pop` are O(1) and never touch existing nodes, so every
/// previous version of the stack remains valid and iterable.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentStack;
///
/// let stack = PersistentStack::new().push(1).push(2);
/// assert_eq!(stack.peek(), Some(&2));
///
/// let popped = stack.pop().unwrap();
/// assert_eq!(popped.peek(), Some(&1));
/// // The original is untouched.
/// assert_eq!(stack.len(), 2);
/// ```
pub struct PersistentStack<T> {
    head: Option<Arc<StackNode<T>>>,
    length: usize,
}

impl<T> Clone for PersistentStack<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            length: self.length,
        }
    }
}

impl<T> PersistentStack<T> {
    /// Creates an empty stack.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            length: 0,
        }
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the stack holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns a new stack with `element` on top.
    #[must_use]
    pub fn push(&self, element: T) -> Self {
        Self {
            head: Some(Arc::new(StackNode {
                element,
                next: self.head.clone(),
            })),
            length: self.length + 1,
        }
    }

    /// Returns the top element, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.element)
    }

    /// Returns the stack without its top element, or `None` if empty.
    #[must_use]
    pub fn pop(&self) -> Option<Self> {
        self.head.as_deref().map(|node| Self {
            head: node.next.clone(),
            length: self.length - 1,
        })
    }

    /// Iterates top-to-bottom.
    pub fn iter(&self) -> PersistentStackIterator<'_, T> {
        PersistentStackIterator {
            node: self.head.as_deref(),
        }
    }
}

impl<T> Default for PersistentStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentStack<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over a [`PersistentStack`], top-to-bottom.
pub struct PersistentStackIterator<'a, T> {
    node: Option<&'a StackNode<T>>,
}

impl<'a, T> Iterator for PersistentStackIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.element)
    }
}

impl<T> FromIterator<T> for PersistentStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iterable: I) -> Self {
        iterable
            .into_iter()
            .fold(Self::new(), |stack, element| stack.push(element))
    }
}

// =============================================================================
// PersistentQueue
// =============================================================================

/// An immutable FIFO queue built from two [`PersistentStack`]s.
///
/// `enqueue` pushes onto the incoming stack; `dequeue` pops from the
/// outgoing stack, reversing the incoming stack into it when it runs
/// dry. Amortized O(1) per operation across any single version chain.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentQueue;
///
/// let queue = PersistentQueue::new().enqueue(1).enqueue(2).enqueue(3);
/// let (front, rest) = queue.dequeue().unwrap();
/// assert_eq!(front, 1);
/// assert_eq!(rest.len(), 2);
/// ```
pub struct PersistentQueue<T> {
    incoming: PersistentStack<T>,
    outgoing: PersistentStack<T>,
}

impl<T> Clone for PersistentQueue<T> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
            outgoing: self.outgoing.clone(),
        }
    }
}

impl<T> PersistentQueue<T> {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            incoming: PersistentStack::new(),
            outgoing: PersistentStack::new(),
        }
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    /// Returns `true` if the queue holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> PersistentQueue<T> {
    /// Returns a new queue with `element` at the back.
    #[must_use]
    pub fn enqueue(&self, element: T) -> Self {
        Self {
            incoming: self.incoming.push(element),
            outgoing: self.outgoing.clone(),
        }
    }

    /// Returns the front element and the queue without it, or `None` if empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<(T, Self)> {
        if let Some(front) = self.outgoing.peek() {
            return Some((
                front.clone(),
                Self {
                    incoming: self.incoming.clone(),
                    outgoing: self.outgoing.pop().unwrap_or_default(),
                },
            ));
        }
        if self.incoming.is_empty() {
            return None;
        }
        // Reverse the incoming stack into the outgoing one.
        let outgoing: PersistentStack<T> = self.incoming.iter().cloned().collect();
        let front = outgoing.peek().cloned()?;
        Some((
            front,
            Self {
                incoming: PersistentStack::new(),
                outgoing: outgoing.pop().unwrap_or_default(),
            },
        ))
    }

    /// Returns the front element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        if let Some(front) = self.outgoing.peek() {
            return Some(front.clone());
        }
        self.incoming.iter().last().cloned()
    }
}

impl<T> Default for PersistentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for PersistentQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iterable: I) -> Self {
        iterable
            .into_iter()
            .fold(Self::new(), |queue, element| queue.enqueue(element))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::{PersistentQueue, PersistentStack};
    use rstest::rstest;

    #[rstest]
    fn test_stack_push_pop_order() {
        let stack = PersistentStack::new().push(1).push(2).push(3);
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        let popped = stack.pop().unwrap();
        assert_eq!(popped.peek(), Some(&2));
        assert_eq!(stack.len(), 3);
    }

    #[rstest]
    fn test_stack_structural_sharing() {
        let base = PersistentStack::new().push("a").push("b");
        let branch_one = base.push("c");
        let branch_two = base.push("d");
        assert_eq!(branch_one.peek(), Some(&"c"));
        assert_eq!(branch_two.peek(), Some(&"d"));
        assert_eq!(base.len(), 2);
    }

    #[rstest]
    fn test_queue_fifo_order() {
        let queue: PersistentQueue<i32> = (1..=5).collect();
        let mut current = queue;
        let mut drained = Vec::new();
        while let Some((front, rest)) = current.dequeue() {
            drained.push(front);
            current = rest;
        }
        assert_eq!(drained, vec![1, 2, 3, 4, 5]);
    }

    #[rstest]
    fn test_queue_peek_and_empty() {
        let empty: PersistentQueue<i32> = PersistentQueue::new();
        assert!(empty.dequeue().is_none());
        assert!(empty.peek().is_none());

        let queue = empty.enqueue(7);
        assert_eq!(queue.peek(), Some(7));
        assert_eq!(queue.len(), 1);
    }
}
