use std::sync::Arc;

use tracing::trace;

use crate::{
    error::{ConfigError, Result},
    lookup::CharacterLookup,
    options::ReaderOptions,
    state_machine::TransitionTables,
};

/// Validated options together with everything derived from them.
///
/// Compiling is the only place options are checked. A compiled grammar is
/// immutable and is shared, via [`Arc`], by every reader built from it.
#[derive(Debug)]
pub struct Grammar {
    options: ReaderOptions,
    lookup: CharacterLookup,
    tables: TransitionTables,
}

impl Grammar {
    /// Validates `options` and compiles the lookup and transition tables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BufferSize`] if `buffer_size` is zero or larger than
    /// `max_buffer_size`, and [`ConfigError::DuplicateRole`] if two roles
    /// share a character.
    pub fn compile(options: &ReaderOptions) -> Result<Arc<Self>> {
        if options.buffer_size == 0 || options.buffer_size > options.max_buffer_size {
            return Err(ConfigError::BufferSize {
                size: options.buffer_size,
                max: options.max_buffer_size,
            }
            .into());
        }
        let lookup = CharacterLookup::build(options)?;
        let tables = TransitionTables::compile(options.escape);
        trace!(?options, "compiled grammar");
        Ok(Arc::new(Self {
            options: *options,
            lookup,
            tables,
        }))
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    #[inline]
    #[must_use]
    pub fn lookup(&self) -> &CharacterLookup {
        &self.lookup
    }

    #[inline]
    pub(crate) fn tables(&self) -> &TransitionTables {
        &self.tables
    }
}
