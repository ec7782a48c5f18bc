//! Persistent (immutable) 2-3 tree.
//!
//! This module provides [`Persistent23Tree`], an ordered, structurally
//! shared balanced search tree. Internal nodes hold one key and two
//! children or two keys and three children; every leaf sits at the same
//! depth, so lookup, insert, and remove are all O(log N).
//!
//! The container holds an atomic *current root*. Readers take frozen
//! [`ImmutableTree`] snapshots and never synchronize. Writers build a
//! private version through a [`MutableTree`] view — every mutation
//! copies only the root-to-leaf path and shares all untouched subtrees —
//! and commit with [`MutableTree::end_write`], a compare-and-swap against
//! the still-current root. A losing writer gets `false` back and retries
//! against the new base; nobody ever blocks.
//!
//! # Examples
//!
//! ```rust
//! use evergreen::persistent::Persistent23Tree;
//!
//! let tree = Persistent23Tree::new();
//! let mut write = tree.begin_write();
//! for key in [5, 1, 4, 2, 3] {
//!     write.add(key);
//! }
//! assert!(write.end_write());
//!
//! let snapshot = tree.begin_read();
//! assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
//! assert_eq!(snapshot.tail_iter(&4).copied().collect::<Vec<_>>(), vec![4, 5]);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use smallvec::SmallVec;

// =============================================================================
// Node Definition
// =============================================================================

/// A 2-3 tree node. The shape set is closed: leaves carry one or two
/// keys and no children, branches carry one key and two children or two
/// keys and three children.
enum Node<K> {
    Leaf2 {
        key: K,
    },
    Leaf3 {
        first: K,
        second: K,
    },
    Branch2 {
        key: K,
        left: Arc<Node<K>>,
        right: Arc<Node<K>>,
    },
    Branch3 {
        first: K,
        second: K,
        left: Arc<Node<K>>,
        middle: Arc<Node<K>>,
        right: Arc<Node<K>>,
    },
}

/// One addressable item of a node, in key order: children interleaved
/// with keys. Iteration walks items left to right (or right to left).
enum NodeItem<'a, K> {
    Key(&'a K),
    Child(&'a Node<K>),
}

impl<K> Node<K> {
    fn item_count(&self) -> usize {
        match self {
            Self::Leaf2 { .. } => 1,
            Self::Leaf3 { .. } => 2,
            Self::Branch2 { .. } => 3,
            Self::Branch3 { .. } => 5,
        }
    }

    fn item(&self, index: usize) -> NodeItem<'_, K> {
        match (self, index) {
            (Self::Leaf2 { key }, 0) | (Self::Branch2 { key, .. }, 1) => NodeItem::Key(key),
            (Self::Leaf3 { first, .. }, 0) | (Self::Branch3 { first, .. }, 1) => {
                NodeItem::Key(first)
            }
            (Self::Leaf3 { second, .. }, 1) | (Self::Branch3 { second, .. }, 3) => {
                NodeItem::Key(second)
            }
            (Self::Branch2 { left, .. }, 0) | (Self::Branch3 { left, .. }, 0) => {
                NodeItem::Child(left)
            }
            (Self::Branch3 { middle, .. }, 2) => NodeItem::Child(middle),
            (Self::Branch2 { right, .. }, 2) | (Self::Branch3 { right, .. }, 4) => {
                NodeItem::Child(right)
            }
            _ => unreachable!("item index out of range for node shape"),
        }
    }
}

// =============================================================================
// Pure node operations
// =============================================================================

/// Result of inserting into a subtree: the replacement node(s) for the
/// subtree's slot, possibly split in two with a promoted separator.
enum InsertOutcome<K> {
    /// An equal key was replaced; the element count did not grow.
    Replaced(Arc<Node<K>>),
    /// The key was added and the subtree absorbed it at the same height.
    Grown(Arc<Node<K>>),
    /// The subtree split; the separator must be promoted to the parent.
    Split {
        left: Arc<Node<K>>,
        separator: K,
        right: Arc<Node<K>>,
    },
}

/// Result of removing from a subtree. `Shrunk` marks a deficient
/// subtree (one level shorter than before, `None` when empty) that the
/// parent must merge or rebalance away.
enum RemoveOutcome<K> {
    NotFound,
    Same(Arc<Node<K>>, K),
    Shrunk(Option<Arc<Node<K>>>, K),
}

/// Two child-height subtrees plus a separator, or a single merged
/// child-height subtree — the output of absorbing a deficient child
/// into a sibling.
enum Combined<K> {
    Two(Arc<Node<K>>, K, Arc<Node<K>>),
    One(Arc<Node<K>>),
}

fn search<'a, K>(
    mut node: &'a Node<K>,
    probe: &impl Fn(&K) -> Ordering,
) -> Option<&'a K> {
    loop {
        match node {
            Node::Leaf2 { key } => {
                return (probe(key) == Ordering::Equal).then_some(key);
            }
            Node::Leaf3 { first, second } => {
                if probe(first) == Ordering::Equal {
                    return Some(first);
                }
                if probe(second) == Ordering::Equal {
                    return Some(second);
                }
                return None;
            }
            Node::Branch2 { key, left, right } => match probe(key) {
                Ordering::Equal => return Some(key),
                // Stored key above the target: descend left.
                Ordering::Greater => node = left,
                Ordering::Less => node = right,
            },
            Node::Branch3 {
                first,
                second,
                left,
                middle,
                right,
            } => match probe(first) {
                Ordering::Equal => return Some(first),
                Ordering::Greater => node = left,
                Ordering::Less => match probe(second) {
                    Ordering::Equal => return Some(second),
                    Ordering::Greater => node = middle,
                    Ordering::Less => node = right,
                },
            },
        }
    }
}

fn edge_key<K>(mut node: &Node<K>, minimum: bool) -> &K {
    loop {
        match node {
            Node::Leaf2 { key } => return key,
            Node::Leaf3 { first, second } => return if minimum { first } else { second },
            Node::Branch2 { left, right, .. } => {
                node = if minimum { left } else { right };
            }
            Node::Branch3 { left, right, .. } => {
                node = if minimum { left } else { right };
            }
        }
    }
}

fn insert<K: Ord + Clone>(node: &Node<K>, key: K) -> InsertOutcome<K> {
    match node {
        Node::Leaf2 { key: existing } => match key.cmp(existing) {
            Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Leaf2 { key })),
            Ordering::Less => InsertOutcome::Grown(Arc::new(Node::Leaf3 {
                first: key,
                second: existing.clone(),
            })),
            Ordering::Greater => InsertOutcome::Grown(Arc::new(Node::Leaf3 {
                first: existing.clone(),
                second: key,
            })),
        },
        Node::Leaf3 { first, second } => match key.cmp(first) {
            Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Leaf3 {
                first: key,
                second: second.clone(),
            })),
            Ordering::Less => InsertOutcome::Split {
                left: Arc::new(Node::Leaf2 { key }),
                separator: first.clone(),
                right: Arc::new(Node::Leaf2 {
                    key: second.clone(),
                }),
            },
            Ordering::Greater => match key.cmp(second) {
                Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Leaf3 {
                    first: first.clone(),
                    second: key,
                })),
                Ordering::Less => InsertOutcome::Split {
                    left: Arc::new(Node::Leaf2 { key: first.clone() }),
                    separator: key,
                    right: Arc::new(Node::Leaf2 {
                        key: second.clone(),
                    }),
                },
                Ordering::Greater => InsertOutcome::Split {
                    left: Arc::new(Node::Leaf2 { key: first.clone() }),
                    separator: second.clone(),
                    right: Arc::new(Node::Leaf2 { key }),
                },
            },
        },
        Node::Branch2 {
            key: separator,
            left,
            right,
        } => match key.cmp(separator) {
            Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Branch2 {
                key,
                left: left.clone(),
                right: right.clone(),
            })),
            Ordering::Less => match insert(left, key) {
                InsertOutcome::Replaced(child) => InsertOutcome::Replaced(Arc::new(Node::Branch2 {
                    key: separator.clone(),
                    left: child,
                    right: right.clone(),
                })),
                InsertOutcome::Grown(child) => InsertOutcome::Grown(Arc::new(Node::Branch2 {
                    key: separator.clone(),
                    left: child,
                    right: right.clone(),
                })),
                InsertOutcome::Split {
                    left: split_left,
                    separator: promoted,
                    right: split_right,
                } => InsertOutcome::Grown(Arc::new(Node::Branch3 {
                    first: promoted,
                    second: separator.clone(),
                    left: split_left,
                    middle: split_right,
                    right: right.clone(),
                })),
            },
            Ordering::Greater => match insert(right, key) {
                InsertOutcome::Replaced(child) => InsertOutcome::Replaced(Arc::new(Node::Branch2 {
                    key: separator.clone(),
                    left: left.clone(),
                    right: child,
                })),
                InsertOutcome::Grown(child) => InsertOutcome::Grown(Arc::new(Node::Branch2 {
                    key: separator.clone(),
                    left: left.clone(),
                    right: child,
                })),
                InsertOutcome::Split {
                    left: split_left,
                    separator: promoted,
                    right: split_right,
                } => InsertOutcome::Grown(Arc::new(Node::Branch3 {
                    first: separator.clone(),
                    second: promoted,
                    left: left.clone(),
                    middle: split_left,
                    right: split_right,
                })),
            },
        },
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => match key.cmp(first) {
            Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Branch3 {
                first: key,
                second: second.clone(),
                left: left.clone(),
                middle: middle.clone(),
                right: right.clone(),
            })),
            Ordering::Less => match insert(left, key) {
                InsertOutcome::Replaced(child) => replaced_branch3(node, Slot::Left, child),
                InsertOutcome::Grown(child) => grown_branch3(node, Slot::Left, child),
                InsertOutcome::Split {
                    left: split_left,
                    separator: promoted,
                    right: split_right,
                } => InsertOutcome::Split {
                    left: Arc::new(Node::Branch2 {
                        key: promoted,
                        left: split_left,
                        right: split_right,
                    }),
                    separator: first.clone(),
                    right: Arc::new(Node::Branch2 {
                        key: second.clone(),
                        left: middle.clone(),
                        right: right.clone(),
                    }),
                },
            },
            Ordering::Greater => match key.cmp(second) {
                Ordering::Equal => InsertOutcome::Replaced(Arc::new(Node::Branch3 {
                    first: first.clone(),
                    second: key,
                    left: left.clone(),
                    middle: middle.clone(),
                    right: right.clone(),
                })),
                Ordering::Less => match insert(middle, key) {
                    InsertOutcome::Replaced(child) => replaced_branch3(node, Slot::Middle, child),
                    InsertOutcome::Grown(child) => grown_branch3(node, Slot::Middle, child),
                    InsertOutcome::Split {
                        left: split_left,
                        separator: promoted,
                        right: split_right,
                    } => InsertOutcome::Split {
                        left: Arc::new(Node::Branch2 {
                            key: first.clone(),
                            left: left.clone(),
                            right: split_left,
                        }),
                        separator: promoted,
                        right: Arc::new(Node::Branch2 {
                            key: second.clone(),
                            left: split_right,
                            right: right.clone(),
                        }),
                    },
                },
                Ordering::Greater => match insert(right, key) {
                    InsertOutcome::Replaced(child) => replaced_branch3(node, Slot::Right, child),
                    InsertOutcome::Grown(child) => grown_branch3(node, Slot::Right, child),
                    InsertOutcome::Split {
                        left: split_left,
                        separator: promoted,
                        right: split_right,
                    } => InsertOutcome::Split {
                        left: Arc::new(Node::Branch2 {
                            key: first.clone(),
                            left: left.clone(),
                            right: middle.clone(),
                        }),
                        separator: second.clone(),
                        right: Arc::new(Node::Branch2 {
                            key: promoted,
                            left: split_left,
                            right: split_right,
                        }),
                    },
                },
            },
        },
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Left,
    Middle,
    Right,
}

fn rebuild_branch3<K: Clone>(node: &Node<K>, slot: Slot, child: Arc<Node<K>>) -> Arc<Node<K>> {
    let Node::Branch3 {
        first,
        second,
        left,
        middle,
        right,
    } = node
    else {
        unreachable!("rebuild_branch3 on a non-ternary node");
    };
    let (left, middle, right) = match slot {
        Slot::Left => (child, middle.clone(), right.clone()),
        Slot::Middle => (left.clone(), child, right.clone()),
        Slot::Right => (left.clone(), middle.clone(), child),
    };
    Arc::new(Node::Branch3 {
        first: first.clone(),
        second: second.clone(),
        left,
        middle,
        right,
    })
}

fn replaced_branch3<K: Clone>(node: &Node<K>, slot: Slot, child: Arc<Node<K>>) -> InsertOutcome<K> {
    InsertOutcome::Replaced(rebuild_branch3(node, slot, child))
}

fn grown_branch3<K: Clone>(node: &Node<K>, slot: Slot, child: Arc<Node<K>>) -> InsertOutcome<K> {
    InsertOutcome::Grown(rebuild_branch3(node, slot, child))
}

/// Absorbs a deficient subtree sitting to the *left* of `sibling`,
/// using `separator` as the key between them.
fn combine_left<K: Clone>(
    separator: K,
    deficient: Option<Arc<Node<K>>>,
    sibling: &Node<K>,
) -> Combined<K> {
    match sibling {
        Node::Leaf2 { key } => Combined::One(Arc::new(Node::Leaf3 {
            first: separator,
            second: key.clone(),
        })),
        Node::Leaf3 { first, second } => Combined::Two(
            Arc::new(Node::Leaf2 { key: separator }),
            first.clone(),
            Arc::new(Node::Leaf2 {
                key: second.clone(),
            }),
        ),
        Node::Branch2 { key, left, right } => Combined::One(Arc::new(Node::Branch3 {
            first: separator,
            second: key.clone(),
            left: deficient.expect("deficient branch child missing"),
            middle: left.clone(),
            right: right.clone(),
        })),
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => Combined::Two(
            Arc::new(Node::Branch2 {
                key: separator,
                left: deficient.expect("deficient branch child missing"),
                right: left.clone(),
            }),
            first.clone(),
            Arc::new(Node::Branch2 {
                key: second.clone(),
                left: middle.clone(),
                right: right.clone(),
            }),
        ),
    }
}

/// Mirror of [`combine_left`] for a deficient subtree to the *right*
/// of `sibling`.
fn combine_right<K: Clone>(
    separator: K,
    sibling: &Node<K>,
    deficient: Option<Arc<Node<K>>>,
) -> Combined<K> {
    match sibling {
        Node::Leaf2 { key } => Combined::One(Arc::new(Node::Leaf3 {
            first: key.clone(),
            second: separator,
        })),
        Node::Leaf3 { first, second } => Combined::Two(
            Arc::new(Node::Leaf2 { key: first.clone() }),
            second.clone(),
            Arc::new(Node::Leaf2 { key: separator }),
        ),
        Node::Branch2 { key, left, right } => Combined::One(Arc::new(Node::Branch3 {
            first: key.clone(),
            second: separator,
            left: left.clone(),
            middle: right.clone(),
            right: deficient.expect("deficient branch child missing"),
        })),
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => Combined::Two(
            Arc::new(Node::Branch2 {
                key: first.clone(),
                left: left.clone(),
                right: middle.clone(),
            }),
            second.clone(),
            Arc::new(Node::Branch2 {
                key: separator,
                left: right.clone(),
                right: deficient.expect("deficient branch child missing"),
            }),
        ),
    }
}

/// Removes the minimum key of a subtree, reporting whether the subtree
/// kept its height.
fn remove_min<K: Clone>(node: &Node<K>) -> (RemoveState<K>, K) {
    match node {
        Node::Leaf2 { key } => (RemoveState::Shrunk(None), key.clone()),
        Node::Leaf3 { first, second } => (
            RemoveState::Same(Arc::new(Node::Leaf2 {
                key: second.clone(),
            })),
            first.clone(),
        ),
        Node::Branch2 {
            key: separator,
            left,
            right,
        } => {
            let (state, minimum) = remove_min(left);
            let state = match state {
                RemoveState::Same(child) => RemoveState::Same(Arc::new(Node::Branch2 {
                    key: separator.clone(),
                    left: child,
                    right: right.clone(),
                })),
                RemoveState::Shrunk(deficient) => {
                    match combine_left(separator.clone(), deficient, right) {
                        Combined::Two(left, promoted, right) => {
                            RemoveState::Same(Arc::new(Node::Branch2 {
                                key: promoted,
                                left,
                                right,
                            }))
                        }
                        Combined::One(merged) => RemoveState::Shrunk(Some(merged)),
                    }
                }
            };
            (state, minimum)
        }
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => {
            let (state, minimum) = remove_min(left);
            let state = match state {
                RemoveState::Same(child) => RemoveState::Same(Arc::new(Node::Branch3 {
                    first: first.clone(),
                    second: second.clone(),
                    left: child,
                    middle: middle.clone(),
                    right: right.clone(),
                })),
                RemoveState::Shrunk(deficient) => {
                    RemoveState::Same(branch3_after_left_shrunk(
                        first.clone(),
                        second.clone(),
                        deficient,
                        middle,
                        right,
                    ))
                }
            };
            (state, minimum)
        }
    }
}

/// Subtree replacement state during removal, without the removed key.
enum RemoveState<K> {
    Same(Arc<Node<K>>),
    Shrunk(Option<Arc<Node<K>>>),
}

fn branch3_after_left_shrunk<K: Clone>(
    first: K,
    second: K,
    deficient: Option<Arc<Node<K>>>,
    middle: &Arc<Node<K>>,
    right: &Arc<Node<K>>,
) -> Arc<Node<K>> {
    match combine_left(first, deficient, middle) {
        Combined::Two(left, promoted, new_middle) => Arc::new(Node::Branch3 {
            first: promoted,
            second,
            left,
            middle: new_middle,
            right: right.clone(),
        }),
        Combined::One(merged) => Arc::new(Node::Branch2 {
            key: second,
            left: merged,
            right: right.clone(),
        }),
    }
}

fn branch3_after_middle_shrunk<K: Clone>(
    first: K,
    second: K,
    left: &Arc<Node<K>>,
    deficient: Option<Arc<Node<K>>>,
    right: &Arc<Node<K>>,
) -> Arc<Node<K>> {
    match combine_right(first, left, deficient) {
        Combined::Two(new_left, promoted, new_middle) => Arc::new(Node::Branch3 {
            first: promoted,
            second,
            left: new_left,
            middle: new_middle,
            right: right.clone(),
        }),
        Combined::One(merged) => Arc::new(Node::Branch2 {
            key: second,
            left: merged,
            right: right.clone(),
        }),
    }
}

fn branch3_after_right_shrunk<K: Clone>(
    first: K,
    second: K,
    left: &Arc<Node<K>>,
    middle: &Arc<Node<K>>,
    deficient: Option<Arc<Node<K>>>,
) -> Arc<Node<K>> {
    match combine_right(second, middle, deficient) {
        Combined::Two(new_middle, promoted, new_right) => Arc::new(Node::Branch3 {
            first,
            second: promoted,
            left: left.clone(),
            middle: new_middle,
            right: new_right,
        }),
        Combined::One(merged) => Arc::new(Node::Branch2 {
            key: first,
            left: left.clone(),
            right: merged,
        }),
    }
}

fn remove_node<K: Clone>(node: &Node<K>, probe: &impl Fn(&K) -> Ordering) -> RemoveOutcome<K> {
    match node {
        Node::Leaf2 { key } => {
            if probe(key) == Ordering::Equal {
                RemoveOutcome::Shrunk(None, key.clone())
            } else {
                RemoveOutcome::NotFound
            }
        }
        Node::Leaf3 { first, second } => {
            if probe(first) == Ordering::Equal {
                RemoveOutcome::Same(
                    Arc::new(Node::Leaf2 {
                        key: second.clone(),
                    }),
                    first.clone(),
                )
            } else if probe(second) == Ordering::Equal {
                RemoveOutcome::Same(Arc::new(Node::Leaf2 { key: first.clone() }), second.clone())
            } else {
                RemoveOutcome::NotFound
            }
        }
        Node::Branch2 {
            key: separator,
            left,
            right,
        } => match probe(separator) {
            Ordering::Equal => {
                // Replace the separator with its successor, then repair
                // the right subtree the successor came from.
                let (state, successor) = remove_min(right);
                match state {
                    RemoveState::Same(child) => RemoveOutcome::Same(
                        Arc::new(Node::Branch2 {
                            key: successor,
                            left: left.clone(),
                            right: child,
                        }),
                        separator.clone(),
                    ),
                    RemoveState::Shrunk(deficient) => {
                        match combine_right(successor, left, deficient) {
                            Combined::Two(new_left, promoted, new_right) => RemoveOutcome::Same(
                                Arc::new(Node::Branch2 {
                                    key: promoted,
                                    left: new_left,
                                    right: new_right,
                                }),
                                separator.clone(),
                            ),
                            Combined::One(merged) => {
                                RemoveOutcome::Shrunk(Some(merged), separator.clone())
                            }
                        }
                    }
                }
            }
            Ordering::Greater => match remove_node(left, probe) {
                RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                RemoveOutcome::Same(child, removed) => RemoveOutcome::Same(
                    Arc::new(Node::Branch2 {
                        key: separator.clone(),
                        left: child,
                        right: right.clone(),
                    }),
                    removed,
                ),
                RemoveOutcome::Shrunk(deficient, removed) => {
                    match combine_left(separator.clone(), deficient, right) {
                        Combined::Two(new_left, promoted, new_right) => RemoveOutcome::Same(
                            Arc::new(Node::Branch2 {
                                key: promoted,
                                left: new_left,
                                right: new_right,
                            }),
                            removed,
                        ),
                        Combined::One(merged) => RemoveOutcome::Shrunk(Some(merged), removed),
                    }
                }
            },
            Ordering::Less => match remove_node(right, probe) {
                RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                RemoveOutcome::Same(child, removed) => RemoveOutcome::Same(
                    Arc::new(Node::Branch2 {
                        key: separator.clone(),
                        left: left.clone(),
                        right: child,
                    }),
                    removed,
                ),
                RemoveOutcome::Shrunk(deficient, removed) => {
                    match combine_right(separator.clone(), left, deficient) {
                        Combined::Two(new_left, promoted, new_right) => RemoveOutcome::Same(
                            Arc::new(Node::Branch2 {
                                key: promoted,
                                left: new_left,
                                right: new_right,
                            }),
                            removed,
                        ),
                        Combined::One(merged) => RemoveOutcome::Shrunk(Some(merged), removed),
                    }
                }
            },
        },
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => match probe(first) {
            Ordering::Equal => {
                let (state, successor) = remove_min(middle);
                let replacement = match state {
                    RemoveState::Same(child) => Arc::new(Node::Branch3 {
                        first: successor,
                        second: second.clone(),
                        left: left.clone(),
                        middle: child,
                        right: right.clone(),
                    }),
                    RemoveState::Shrunk(deficient) => branch3_after_middle_shrunk(
                        successor,
                        second.clone(),
                        left,
                        deficient,
                        right,
                    ),
                };
                RemoveOutcome::Same(replacement, first.clone())
            }
            Ordering::Greater => match remove_node(left, probe) {
                RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                RemoveOutcome::Same(child, removed) => RemoveOutcome::Same(
                    Arc::new(Node::Branch3 {
                        first: first.clone(),
                        second: second.clone(),
                        left: child,
                        middle: middle.clone(),
                        right: right.clone(),
                    }),
                    removed,
                ),
                RemoveOutcome::Shrunk(deficient, removed) => RemoveOutcome::Same(
                    branch3_after_left_shrunk(
                        first.clone(),
                        second.clone(),
                        deficient,
                        middle,
                        right,
                    ),
                    removed,
                ),
            },
            Ordering::Less => match probe(second) {
                Ordering::Equal => {
                    let (state, successor) = remove_min(right);
                    let replacement = match state {
                        RemoveState::Same(child) => Arc::new(Node::Branch3 {
                            first: first.clone(),
                            second: successor,
                            left: left.clone(),
                            middle: middle.clone(),
                            right: child,
                        }),
                        RemoveState::Shrunk(deficient) => branch3_after_right_shrunk(
                            first.clone(),
                            successor,
                            left,
                            middle,
                            deficient,
                        ),
                    };
                    RemoveOutcome::Same(replacement, second.clone())
                }
                Ordering::Greater => match remove_node(middle, probe) {
                    RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                    RemoveOutcome::Same(child, removed) => RemoveOutcome::Same(
                        Arc::new(Node::Branch3 {
                            first: first.clone(),
                            second: second.clone(),
                            left: left.clone(),
                            middle: child,
                            right: right.clone(),
                        }),
                        removed,
                    ),
                    RemoveOutcome::Shrunk(deficient, removed) => RemoveOutcome::Same(
                        branch3_after_middle_shrunk(
                            first.clone(),
                            second.clone(),
                            left,
                            deficient,
                            right,
                        ),
                        removed,
                    ),
                },
                Ordering::Less => match remove_node(right, probe) {
                    RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                    RemoveOutcome::Same(child, removed) => RemoveOutcome::Same(
                        Arc::new(Node::Branch3 {
                            first: first.clone(),
                            second: second.clone(),
                            left: left.clone(),
                            middle: middle.clone(),
                            right: child,
                        }),
                        removed,
                    ),
                    RemoveOutcome::Shrunk(deficient, removed) => RemoveOutcome::Same(
                        branch3_after_right_shrunk(
                            first.clone(),
                            second.clone(),
                            left,
                            middle,
                            deficient,
                        ),
                        removed,
                    ),
                },
            },
        },
    }
}

// =============================================================================
// Root and snapshot
// =============================================================================

/// Root carrier: the subtree plus the element count. Only the root
/// tracks size; interior nodes stay size-free so rebalancing never pays
/// for counter maintenance.
struct Root<K> {
    node: Arc<Node<K>>,
    size: usize,
}

fn same_root<K>(a: Option<&Arc<Root<K>>>, b: Option<&Arc<Root<K>>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(left), Some(right)) => Arc::ptr_eq(left, right),
        _ => false,
    }
}

/// A frozen snapshot of a [`Persistent23Tree`].
///
/// Snapshots are cheap to clone (an `Arc` bump) and safe to read from
/// any thread while writers race on the owning container.
pub struct ImmutableTree<K> {
    root: Option<Arc<Root<K>>>,
}

impl<K> Clone for ImmutableTree<K> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K> ImmutableTree<K> {
    /// An empty snapshot.
    #[must_use]
    pub const fn empty() -> Self {
        Self { root: None }
    }

    /// Number of keys in the snapshot. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.size)
    }

    /// Returns `true` if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Looks up a key by an arbitrary ordering probe. The probe returns
    /// the ordering of the *stored* key relative to the target.
    ///
    /// This is the hook map-like wrappers use to search by the key
    /// portion of an entry without constructing a whole entry.
    #[must_use]
    pub fn get_with(&self, probe: impl Fn(&K) -> Ordering) -> Option<&K> {
        search(&self.root.as_ref()?.node, &probe)
    }

    /// Smallest key, if any.
    #[must_use]
    pub fn minimum(&self) -> Option<&K> {
        self.root.as_ref().map(|root| edge_key(&root.node, true))
    }

    /// Largest key, if any.
    #[must_use]
    pub fn maximum(&self) -> Option<&K> {
        self.root.as_ref().map(|root| edge_key(&root.node, false))
    }

    /// Forward iteration in strictly increasing key order.
    pub fn iter(&self) -> TreeIterator<'_, K> {
        TreeIterator::full(self.root.as_ref().map(|root| &*root.node), false)
    }

    /// Reverse iteration in strictly decreasing key order.
    pub fn rev_iter(&self) -> TreeIterator<'_, K> {
        TreeIterator::full(self.root.as_ref().map(|root| &*root.node), true)
    }

    /// Forward iteration over keys the probe reports as `Equal` or
    /// `Greater` — the suffix starting at the probe's boundary.
    pub fn tail_iter_with(&self, probe: impl Fn(&K) -> Ordering) -> TreeIterator<'_, K> {
        TreeIterator::tail(self.root.as_ref().map(|root| &*root.node), &probe)
    }
}

impl<K: Ord> ImmutableTree<K> {
    /// Looks up `key`. Returns the stored key, which for entry-like key
    /// types carries the payload ordering ignores.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&K> {
        self.get_with(|stored| stored.cmp(key))
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Forward iteration over keys `>= from`. A bound above the maximum
    /// yields an empty sequence.
    pub fn tail_iter(&self, from: &K) -> TreeIterator<'_, K> {
        self.tail_iter_with(|stored| stored.cmp(from))
    }
}

impl<K: Ord + Clone> ImmutableTree<K> {
    /// Reverse iteration over the `>= from` suffix: the exact reverse
    /// of [`tail_iter`](Self::tail_iter).
    pub fn rev_tail_iter(&self, from: &K) -> impl Iterator<Item = &K> {
        let bound = from.clone();
        self.rev_iter().take_while(move |key| **key >= bound)
    }

    /// Pure insert: returns the next version and whether the element
    /// count grew (`false` means an equal key was replaced).
    #[must_use]
    pub fn add(&self, key: K) -> (Self, bool) {
        let Some(root) = self.root.as_ref() else {
            return (
                Self {
                    root: Some(Arc::new(Root {
                        node: Arc::new(Node::Leaf2 { key }),
                        size: 1,
                    })),
                },
                true,
            );
        };
        let (node, grew) = match insert(&root.node, key) {
            InsertOutcome::Replaced(node) => (node, false),
            InsertOutcome::Grown(node) => (node, true),
            InsertOutcome::Split {
                left,
                separator,
                right,
            } => (
                Arc::new(Node::Branch2 {
                    key: separator,
                    left,
                    right,
                }),
                true,
            ),
        };
        let size = if grew { root.size + 1 } else { root.size };
        (
            Self {
                root: Some(Arc::new(Root { node, size })),
            },
            grew,
        )
    }

    /// Pure removal by ordering probe: the next version plus the removed
    /// key, or `None` when nothing matched (a strict miss is a no-op).
    #[must_use]
    pub fn remove_with(&self, probe: impl Fn(&K) -> Ordering) -> Option<(Self, K)> {
        let root = self.root.as_ref()?;
        match remove_node(&root.node, &probe) {
            RemoveOutcome::NotFound => None,
            RemoveOutcome::Same(node, removed) => Some((
                Self {
                    root: Some(Arc::new(Root {
                        node,
                        size: root.size - 1,
                    })),
                },
                removed,
            )),
            RemoveOutcome::Shrunk(node, removed) => Some((
                Self {
                    root: node.map(|node| {
                        Arc::new(Root {
                            node,
                            size: root.size - 1,
                        })
                    }),
                },
                removed,
            )),
        }
    }

    /// Pure removal by key.
    #[must_use]
    pub fn remove(&self, key: &K) -> Option<(Self, K)> {
        self.remove_with(|stored| stored.cmp(key))
    }

    /// Recursively checks the structural invariants: perfect balance
    /// (every leaf at equal depth) and strict key ordering within nodes
    /// and across child ranges.
    ///
    /// # Panics
    ///
    /// Panics on any violation. A failure here is a logic defect in the
    /// tree, not a recoverable condition.
    pub fn check_invariants(&self) {
        if let Some(root) = self.root.as_ref() {
            let (depth, count) = check_node(&root.node, None, None);
            assert_eq!(count, root.size, "root size does not match key count");
            let _ = depth;
        }
    }
}

/// Returns (depth, key count) of the subtree, panicking on imbalance or
/// ordering violations. `lower`/`upper` are the exclusive range bounds
/// inherited from the separating keys above.
fn check_node<K: Ord>(node: &Node<K>, lower: Option<&K>, upper: Option<&K>) -> (usize, usize) {
    let in_range = |key: &K| {
        assert!(lower.is_none_or(|bound| bound < key), "key below range");
        assert!(upper.is_none_or(|bound| key < bound), "key above range");
    };
    match node {
        Node::Leaf2 { key } => {
            in_range(key);
            (1, 1)
        }
        Node::Leaf3 { first, second } => {
            in_range(first);
            in_range(second);
            assert!(first < second, "leaf keys out of order");
            (1, 2)
        }
        Node::Branch2 { key, left, right } => {
            in_range(key);
            let (left_depth, left_count) = check_node(left, lower, Some(key));
            let (right_depth, right_count) = check_node(right, Some(key), upper);
            assert_eq!(left_depth, right_depth, "leaves at unequal depth");
            (left_depth + 1, left_count + right_count + 1)
        }
        Node::Branch3 {
            first,
            second,
            left,
            middle,
            right,
        } => {
            in_range(first);
            in_range(second);
            assert!(first < second, "branch keys out of order");
            let (left_depth, left_count) = check_node(left, lower, Some(first));
            let (middle_depth, middle_count) = check_node(middle, Some(first), Some(second));
            let (right_depth, right_count) = check_node(right, Some(second), upper);
            assert_eq!(left_depth, middle_depth, "leaves at unequal depth");
            assert_eq!(left_depth, right_depth, "leaves at unequal depth");
            (left_depth + 1, left_count + middle_count + right_count + 2)
        }
    }
}

// =============================================================================
// Iterator
// =============================================================================

struct Frame<'a, K> {
    node: &'a Node<K>,
    position: usize,
}

/// Iterator over a 2-3 tree snapshot, driven by an explicit stack of
/// `(node, position)` frames sized to the tree depth.
pub struct TreeIterator<'a, K> {
    stack: SmallVec<[Frame<'a, K>; 12]>,
    reverse: bool,
}

impl<'a, K> TreeIterator<'a, K> {
    fn full(root: Option<&'a Node<K>>, reverse: bool) -> Self {
        let mut stack = SmallVec::new();
        if let Some(node) = root {
            stack.push(Frame { node, position: 0 });
        }
        Self { stack, reverse }
    }

    /// Seeds the stack so iteration starts at the first key the probe
    /// does not report `Less` — the predecessor-boundary descent.
    fn tail(root: Option<&'a Node<K>>, probe: &impl Fn(&K) -> Ordering) -> Self {
        let mut stack: SmallVec<[Frame<'a, K>; 12]> = SmallVec::new();
        let mut node = match root {
            Some(node) => node,
            None => {
                return Self {
                    stack,
                    reverse: false,
                };
            }
        };
        loop {
            match node {
                Node::Leaf2 { key } => {
                    let position = usize::from(probe(key) == Ordering::Less);
                    stack.push(Frame { node, position });
                    break;
                }
                Node::Leaf3 { first, second } => {
                    let position = if probe(first) != Ordering::Less {
                        0
                    } else if probe(second) != Ordering::Less {
                        1
                    } else {
                        2
                    };
                    stack.push(Frame { node, position });
                    break;
                }
                Node::Branch2 { key, left, right } => {
                    if probe(key) == Ordering::Less {
                        stack.push(Frame { node, position: 3 });
                        node = right;
                    } else {
                        stack.push(Frame { node, position: 1 });
                        node = left;
                    }
                }
                Node::Branch3 {
                    first,
                    second,
                    left,
                    middle,
                    right,
                } => {
                    if probe(first) != Ordering::Less {
                        stack.push(Frame { node, position: 1 });
                        node = left;
                    } else if probe(second) != Ordering::Less {
                        stack.push(Frame { node, position: 3 });
                        node = middle;
                    } else {
                        stack.push(Frame { node, position: 5 });
                        node = right;
                    }
                }
            }
        }
        Self {
            stack,
            reverse: false,
        }
    }
}

impl<'a, K> Iterator for TreeIterator<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let count = frame.node.item_count();
            if frame.position >= count {
                self.stack.pop();
                continue;
            }
            let index = if self.reverse {
                count - 1 - frame.position
            } else {
                frame.position
            };
            frame.position += 1;
            match frame.node.item(index) {
                NodeItem::Key(key) => return Some(key),
                NodeItem::Child(child) => self.stack.push(Frame {
                    node: child,
                    position: 0,
                }),
            }
        }
    }
}

// =============================================================================
// Container
// =============================================================================

/// A versioned 2-3 tree with an atomic current root.
///
/// Cloning the container snapshots the current root into a fresh,
/// independent container (the structure itself is shared).
///
/// # Concurrency
///
/// Any number of threads may call [`begin_read`](Self::begin_read)
/// concurrently with writers. Writers race on
/// [`MutableTree::end_write`]; the loser must rebuild against the new
/// base and retry.
pub struct Persistent23Tree<K> {
    root: ArcSwapOption<Root<K>>,
}

static_assertions::assert_impl_all!(Persistent23Tree<i64>: Send, Sync);
static_assertions::assert_impl_all!(ImmutableTree<i64>: Send, Sync);

impl<K> Persistent23Tree<K> {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: ArcSwapOption::const_empty(),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableTree<K> {
        ImmutableTree {
            root: self.root.load_full(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableTree<'_, K> {
        let base = self.root.load_full();
        MutableTree {
            tree: self,
            current: ImmutableTree { root: base.clone() },
            base,
        }
    }

    /// Element count of the current version.
    #[must_use]
    pub fn size(&self) -> usize {
        self.root.load().as_ref().map_or(0, |root| root.size)
    }
}

impl<K> Default for Persistent23Tree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Persistent23Tree<K> {
    fn clone(&self) -> Self {
        Self {
            root: ArcSwapOption::new(self.root.load_full()),
        }
    }
}

impl<K: fmt::Debug + Ord + Clone> fmt::Debug for Persistent23Tree<K> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.begin_read().iter())
            .finish()
    }
}

/// A private copy-on-write view over a [`Persistent23Tree`].
///
/// Mutations allocate new nodes only along the edited path and share
/// everything else with the base version. [`end_write`](Self::end_write)
/// commits atomically; `false` means another writer got there first and
/// this view's edits were discarded.
pub struct MutableTree<'t, K> {
    tree: &'t Persistent23Tree<K>,
    base: Option<Arc<Root<K>>>,
    current: ImmutableTree<K>,
}

impl<K: Ord + Clone> MutableTree<'_, K> {
    /// Adds `key`, replacing an equal key in place. Returns `true` when
    /// the element count grew.
    pub fn add(&mut self, key: K) -> bool {
        let (next, grew) = self.current.add(key);
        self.current = next;
        grew
    }

    /// Removes `key`, returning the stored key. Removing an absent key
    /// is a no-op returning `None`.
    pub fn remove(&mut self, key: &K) -> Option<K> {
        self.remove_with(|stored| stored.cmp(key))
    }

    /// Removes by ordering probe (see [`ImmutableTree::get_with`]).
    pub fn remove_with(&mut self, probe: impl Fn(&K) -> Ordering) -> Option<K> {
        let (next, removed) = self.current.remove_with(probe)?;
        self.current = next;
        Some(removed)
    }

    /// Looks up `key` in the in-progress version.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&K> {
        self.current.get(key)
    }

    /// Looks up the in-progress version by ordering probe.
    #[must_use]
    pub fn get_with(&self, probe: impl Fn(&K) -> Ordering) -> Option<&K> {
        self.current.get_with(probe)
    }

    /// Returns `true` if `key` is present in the in-progress version.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.current.contains(key)
    }

    /// Commits this view: atomically swaps the container's root if it
    /// still matches the base this view started from. On `false` the
    /// container is unchanged and the caller must retry from a fresh
    /// view.
    #[must_use]
    pub fn end_write(self) -> bool {
        let previous = self
            .tree
            .root
            .compare_and_swap(&self.base, self.current.root.clone());
        same_root(previous.as_ref(), self.base.as_ref())
    }
}

impl<K> MutableTree<'_, K> {
    /// Element count of the in-progress version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if the in-progress version is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Forward iteration over the in-progress version.
    pub fn iter(&self) -> TreeIterator<'_, K> {
        self.current.iter()
    }

    /// A frozen snapshot of the in-progress version.
    #[must_use]
    pub fn snapshot(&self) -> ImmutableTree<K> {
        self.current.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::Persistent23Tree;
    use rstest::rstest;

    #[rstest]
    fn test_add_and_iterate_sorted() {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        for key in [9, 3, 7, 1, 5] {
            assert!(write.add(key));
        }
        assert!(write.end_write());
        let snapshot = tree.begin_read();
        snapshot.check_invariants();
        assert_eq!(
            snapshot.iter().copied().collect::<Vec<_>>(),
            vec![1, 3, 5, 7, 9]
        );
    }

    #[rstest]
    fn test_equal_key_replaces_without_growth() {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        assert!(write.add(1));
        assert!(!write.add(1));
        assert_eq!(write.len(), 1);
        assert!(write.end_write());
    }

    #[rstest]
    fn test_losing_writer_fails_end_write() {
        let tree = Persistent23Tree::new();
        let mut first = tree.begin_write();
        let mut second = tree.begin_write();
        first.add(1);
        second.add(2);
        assert!(first.end_write());
        assert!(!second.end_write());
        assert_eq!(tree.size(), 1);
        assert!(tree.begin_read().contains(&1));
    }

    #[rstest]
    fn test_remove_missing_is_noop() {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        write.add(1);
        assert_eq!(write.remove(&2), None);
        assert_eq!(write.len(), 1);
    }
}
