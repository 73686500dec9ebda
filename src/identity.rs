//! Dual identity of jobs and steps
//!
//! Workflow authors refer to a job or step either by its machine identifier
//! (`needs: build`, `steps.checkout.outputs`) or by its display name
//! (`name: Build the docs`). Every lookup in the harness resolves a
//! caller-supplied name against both through [`resolve`].

use crate::error::{EntityKind, HarnessError};

/// Two-field key of an addressable job or step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity<'a> {
    pub id: &'a str,
    pub display_name: Option<&'a str>,
}

impl<'a> Identity<'a> {
    pub fn new(id: &'a str, display_name: Option<&'a str>) -> Self {
        Self { id, display_name }
    }

    /// Whether `name` equals the identifier or the display name
    pub fn matches(&self, name: &str) -> bool {
        self.id == name || self.display_name == Some(name)
    }

    /// Distinct names this identity answers to
    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        let id = self.id;
        std::iter::once(id).chain(self.display_name.filter(move |name| *name != id))
    }
}

/// An entity that can be looked up by identifier or display name
pub trait Addressable {
    fn identity(&self) -> Identity<'_>;
}

/// Position of the first entity answering to `name`
pub fn position<'a, T, I>(name: &str, kind: EntityKind, entities: I) -> Result<usize, HarnessError>
where
    T: Addressable + 'a,
    I: IntoIterator<Item = &'a T>,
{
    entities
        .into_iter()
        .position(|entity| entity.identity().matches(name))
        .ok_or_else(|| HarnessError::not_found(kind, name))
}

/// The first entity answering to `name`
pub fn resolve<'a, T, I>(name: &str, kind: EntityKind, entities: I) -> Result<&'a T, HarnessError>
where
    T: Addressable + 'a,
    I: IntoIterator<Item = &'a T>,
{
    entities
        .into_iter()
        .find(|entity| entity.identity().matches(name))
        .ok_or_else(|| HarnessError::not_found(kind, name))
}
