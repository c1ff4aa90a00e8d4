//! Depth-first composition of producers.
//!
//! Level `i` is built by a factory from the values currently yielded by levels
//! `0..i` and level `i`'s own cursor slot. Items are the tuple of one value per
//! level; the cursor is an array with one slot per level (`Null` for empty).
//!
//! A parent's slot only advances once its whole subtree is exhausted, so a
//! resumed walk re-enters the in-progress parent and continues its child from
//! the child's slot. The child's slot is cleared at that point so the next
//! parent starts its children from scratch. Deeper slots are not cleared;
//! concurrent inserts or deletes between resumptions can therefore skip or
//! repeat deeply nested items.

use super::{BoxProducer, Produced, Producer};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use async_trait::async_trait;
use tracing::trace;

/// Builds the producer for one level from the ancestor values and the level's slot.
pub type NestedFactory<T> =
    Box<dyn Fn(&[T], Option<CursorValue>) -> Result<BoxProducer<T>> + Send + Sync>;

/// Box a closure as a [`NestedFactory`], fixing its argument types.
pub fn level<T, F>(factory: F) -> NestedFactory<T>
where
    F: Fn(&[T], Option<CursorValue>) -> Result<BoxProducer<T>> + Send + Sync + 'static,
{
    Box::new(factory)
}

pub struct NestedProducer<T> {
    factories: Vec<NestedFactory<T>>,
    slots: Vec<Option<CursorValue>>,
    levels: Vec<BoxProducer<T>>,
    ancestors: Vec<T>,
    pending: Vec<CursorValue>,
    started: bool,
    finished: bool,
}

impl<T> std::fmt::Debug for NestedProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedProducer")
            .field("levels", &self.factories.len())
            .field("depth", &self.levels.len())
            .field("slots", &self.slots)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> NestedProducer<T> {
    pub fn new(factories: Vec<NestedFactory<T>>, cursor: Option<CursorValue>) -> Result<Self> {
        if factories.is_empty() {
            return Err(IterationError::EmptyNestedProducer);
        }

        let slots = match cursor {
            None | Some(CursorValue::Null) => vec![None; factories.len()],
            Some(CursorValue::Array(values)) => {
                if values.len() != factories.len() {
                    return Err(IterationError::NestedCursorArity {
                        expected: factories.len(),
                        actual: values.len(),
                    });
                }
                values
                    .into_iter()
                    .map(|v| if v.is_null() { None } else { Some(v) })
                    .collect()
            }
            Some(scalar) => {
                if factories.len() != 1 {
                    return Err(IterationError::NestedCursorArity {
                        expected: factories.len(),
                        actual: 1,
                    });
                }
                vec![Some(scalar)]
            }
        };

        Ok(Self {
            factories,
            slots,
            levels: Vec::new(),
            ancestors: Vec::new(),
            pending: Vec::new(),
            started: false,
            finished: false,
        })
    }

    fn composite_cursor(&self) -> CursorValue {
        CursorValue::Array(
            self.slots
                .iter()
                .map(|slot| slot.clone().unwrap_or(CursorValue::Null))
                .collect(),
        )
    }

    fn push_level(&mut self, depth: usize) -> Result<()> {
        let producer = (self.factories[depth])(&self.ancestors, self.slots[depth].clone())?;
        self.levels.push(producer);
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Producer for NestedProducer<T> {
    type Item = Vec<T>;

    async fn next(&mut self) -> Result<Produced<Vec<T>>> {
        if self.finished {
            return Ok(Produced::Exhausted);
        }
        if !self.started {
            self.started = true;
            self.push_level(0)?;
        }

        let innermost = self.factories.len() - 1;
        loop {
            let Some(depth) = self.levels.len().checked_sub(1) else {
                self.finished = true;
                return Ok(Produced::Exhausted);
            };

            match self.levels[depth].next().await? {
                Produced::Throttled { backoff } => return Ok(Produced::Throttled { backoff }),
                Produced::Exhausted => {
                    self.levels.pop();
                    if depth == 0 {
                        self.finished = true;
                        return Ok(Produced::Exhausted);
                    }
                    // Subtree done: the next parent starts its children fresh,
                    // and the parent itself is now fully processed.
                    self.slots[depth] = None;
                    self.ancestors.pop();
                    self.slots[depth - 1] = self.pending.pop();
                    trace!(depth, "Nested level exhausted");
                }
                Produced::Item { value, cursor } if depth == innermost => {
                    self.slots[depth] = Some(cursor);
                    let mut tuple = self.ancestors.clone();
                    tuple.push(value);
                    return Ok(Produced::item(tuple, self.composite_cursor()));
                }
                Produced::Item { value, cursor } => {
                    self.ancestors.push(value);
                    self.pending.push(cursor);
                    self.push_level(depth + 1)?;
                }
            }
        }
    }
}
