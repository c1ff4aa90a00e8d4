use super::{Produced, Producer};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;

/// Yields in-memory values with their index as the cursor.
///
/// Resuming from cursor `i` skips the first `i + 1` values.
#[derive(Debug, Clone)]
pub struct ArrayProducer<T> {
    remaining: VecDeque<T>,
    next_index: usize,
    len: usize,
}

impl<T> ArrayProducer<T> {
    pub fn new(values: Vec<T>, cursor: Option<CursorValue>) -> Result<Self> {
        let len = values.len();
        let skip = match cursor {
            None | Some(CursorValue::Null) => 0,
            Some(CursorValue::Integer(index)) if index >= 0 => (index as usize).saturating_add(1),
            Some(other) => {
                return Err(IterationError::InvalidPosition {
                    columns: vec!["index".to_string()],
                    reason: format!("array cursor must be a non-negative integer, got {other}"),
                })
            }
        };

        let mut remaining: VecDeque<T> = values.into();
        remaining.drain(..skip.min(len));
        Ok(Self {
            remaining,
            next_index: skip,
            len,
        })
    }
}

impl ArrayProducer<()> {
    /// A single unit item; lets jobs with one indivisible step use the driver.
    pub fn once(cursor: Option<CursorValue>) -> Result<Self> {
        Self::new(vec![()], cursor)
    }
}

impl ArrayProducer<usize> {
    /// Indices `0..count`.
    pub fn times(count: usize, cursor: Option<CursorValue>) -> Result<Self> {
        Self::new((0..count).collect(), cursor)
    }
}

#[async_trait]
impl<T: Send + Sync> Producer for ArrayProducer<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Produced<T>> {
        match self.remaining.pop_front() {
            Some(value) => {
                let index = self.next_index;
                self.next_index += 1;
                Ok(Produced::item(value, CursorValue::from(index)))
            }
            None => Ok(Produced::Exhausted),
        }
    }

    async fn size(&self) -> Result<Option<u64>> {
        Ok(Some(self.len as u64))
    }
}
