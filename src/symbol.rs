//! Lazily resolved, process-wide entry points.
//!
//! Every forwarded export owns one [`SymbolSlot`]. The first call looks the
//! symbol up through a [`SymbolSource`] and publishes the typed entry point;
//! every later call reuses it. Threads that race on the first call block
//! until the single resolution finishes, so none of them can observe a half
//! initialised slot.

use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::ptr::NonNull;

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::loader::SymbolSource;

/// Holds the resolved address of one plugin export.
///
/// `F` is the `unsafe extern "C" fn` type of the export.
pub struct SymbolSlot<F> {
    name: &'static str,
    entry: OnceCell<F>,
}

impl<F: Copy> SymbolSlot<F> {
    /// Creates an unresolved slot for the export `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entry: OnceCell::new(),
        }
    }

    /// Name of the export this slot resolves.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the slot already holds an entry point.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.entry.get().is_some()
    }

    /// Returns the entry point, resolving it through `source` on first use.
    ///
    /// A failed lookup leaves the slot unresolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] when `source` does not export the
    /// symbol.
    ///
    /// # Safety
    ///
    /// `F` must be the function pointer type the export was compiled with.
    ///
    /// [`Error::SymbolNotFound`]: crate::error::Error::SymbolNotFound
    pub unsafe fn resolve(&self, source: &dyn SymbolSource) -> Result<F> {
        const {
            assert!(
                mem::size_of::<F>() == mem::size_of::<NonNull<c_void>>(),
                "slot type must be a function pointer"
            );
        }

        self.entry
            .get_or_try_init(|| {
                let address = source.symbol(self.name)?;
                log::trace!("resolved {} at {:p}", self.name, address);
                // SAFETY: sizes are equal and the caller guarantees `F` is the
                // export's real signature.
                Ok(unsafe { mem::transmute_copy::<NonNull<c_void>, F>(&address) })
            })
            .copied()
    }
}

impl<F> fmt::Debug for SymbolSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolSlot")
            .field("name", &self.name)
            .field("resolved", &self.entry.get().is_some())
            .finish()
    }
}
