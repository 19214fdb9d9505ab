use crate::util::Width;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

/// Persistent operand stack
///
/// Pushing and popping produce new stacks that share their tails with the original, so forking
/// the state at a branch is a reference count bump.
pub struct TypeStack<T> {
    head: Option<Rc<Node<T>>>,
}

struct Node<T> {
    value: T,
    next: Option<Rc<Node<T>>>,

    /// Number of entries, including this one
    len: usize,

    /// Total width of entries, including this one
    slots: usize,
}

impl<T> Clone for TypeStack<T> {
    fn clone(&self) -> Self {
        TypeStack {
            head: self.head.clone(),
        }
    }
}

impl<T> Default for TypeStack<T> {
    fn default() -> Self {
        TypeStack::new()
    }
}

impl<T> TypeStack<T> {
    pub fn new() -> TypeStack<T> {
        TypeStack { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.len)
    }

    /// Number of slots taken up by the entries
    pub fn slots(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.slots)
    }

    pub fn peek(&self) -> Option<&T> {
        self.head.as_ref().map(|node| &node.value)
    }

    /// Iterate from the top of the stack down
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut current = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.next.as_deref();
            Some(&node.value)
        })
    }
}

impl<T: Width> TypeStack<T> {
    pub fn push(&self, value: T) -> TypeStack<T> {
        let slots = self.slots() + value.width();
        TypeStack {
            head: Some(Rc::new(Node {
                value,
                next: self.head.clone(),
                len: self.len() + 1,
                slots,
            })),
        }
    }
}

impl<T: Clone> TypeStack<T> {
    /// Top of the stack, along with the rest of the stack
    pub fn pop(&self) -> Option<(T, TypeStack<T>)> {
        self.head.as_ref().map(|node| {
            let rest = TypeStack {
                head: node.next.clone(),
            };
            (node.value.clone(), rest)
        })
    }

    /// Entries from the bottom of the stack up
    pub fn to_vec(&self) -> Vec<T> {
        let mut values: Vec<T> = self.iter().cloned().collect();
        values.reverse();
        values
    }
}

impl<T: PartialEq> PartialEq for TypeStack<T> {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.head, &other.head) {
            if Rc::ptr_eq(a, b) {
                return true;
            }
        }
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Debug> Debug for TypeStack<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut values: Vec<&T> = self.iter().collect();
        values.reverse();
        f.debug_list().entries(values).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Slot(usize);

    impl Width for Slot {
        fn width(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn forks_share_tails() {
        let base = TypeStack::new().push(Slot(1)).push(Slot(2));
        let left = base.push(Slot(1));
        let (top, right) = base.pop().unwrap();

        assert_eq!(top, Slot(2));
        assert_eq!(base.len(), 2, "popping leaves the original untouched");
        assert_eq!(base.slots(), 3);
        assert_eq!(left.len(), 3);
        assert_eq!(left.slots(), 4);
        assert_eq!(right.len(), 1);
        assert_eq!(left.to_vec(), vec![Slot(1), Slot(2), Slot(1)]);
        assert_eq!(right.peek(), Some(&Slot(1)));
    }

    #[test]
    fn structural_equality() {
        let a = TypeStack::new().push(Slot(1)).push(Slot(2));
        let b = TypeStack::new().push(Slot(1)).push(Slot(2));
        let c = TypeStack::new().push(Slot(2)).push(Slot(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, TypeStack::new());
        assert_eq!(format!("{:?}", a), "[Slot(1), Slot(2)]");
    }
}
