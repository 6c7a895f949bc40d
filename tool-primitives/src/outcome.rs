//! Result type for operations that carry best-effort side effects.

/// Outcome of an operation whose secondary effects (cache writes, audit
/// entries, registry syncs) may fail without failing the operation itself.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T, E> {
    /// Primary operation and every side effect completed.
    Succeeded(T),
    /// Primary operation completed; one or more side effects did not.
    Degraded {
        /// Value produced by the primary operation.
        value: T,
        /// One entry per side effect that failed.
        reasons: Vec<String>,
    },
    /// Primary operation failed.
    Failed(E),
}

impl<T, E> Outcome<T, E> {
    /// Builds an outcome from a value and the side-effect failures collected
    /// while producing it.
    pub fn from_parts(value: T, reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self::Succeeded(value)
        } else {
            Self::Degraded { value, reasons }
        }
    }

    /// Returns `true` unless the primary operation failed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Returns `true` for [`Outcome::Degraded`].
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Returns the side-effect failure reasons, empty unless degraded.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Degraded { reasons, .. } => reasons,
            _ => &[],
        }
    }

    /// Returns the primary value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) | Self::Degraded { value, .. } => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// Returns the primary failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Maps the primary value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Self::Succeeded(value) => Outcome::Succeeded(f(value)),
            Self::Degraded { value, reasons } => Outcome::Degraded {
                value: f(value),
                reasons,
            },
            Self::Failed(err) => Outcome::Failed(err),
        }
    }

    /// Maps the primary failure.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Outcome<T, F> {
        match self {
            Self::Succeeded(value) => Outcome::Succeeded(value),
            Self::Degraded { value, reasons } => Outcome::Degraded { value, reasons },
            Self::Failed(err) => Outcome::Failed(f(err)),
        }
    }

    /// Discards degradation detail, keeping only primary success or failure.
    ///
    /// # Errors
    ///
    /// Returns the primary failure for [`Outcome::Failed`].
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Succeeded(value) | Self::Degraded { value, .. } => Ok(value),
            Self::Failed(err) => Err(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(value) => Self::Succeeded(value),
            Err(err) => Self::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_distinguishes_degraded() {
        let ok: Outcome<u8, ()> = Outcome::from_parts(1, Vec::new());
        assert!(!ok.is_degraded());
        assert_eq!(ok.value(), Some(&1));

        let degraded: Outcome<u8, ()> = Outcome::from_parts(2, vec!["cache write".into()]);
        assert!(degraded.is_degraded());
        assert!(degraded.is_ok());
        assert_eq!(degraded.reasons(), ["cache write"]);
        assert_eq!(degraded.into_result(), Ok(2));
    }

    #[test]
    fn failed_carries_error() {
        let failed: Outcome<u8, &str> = Outcome::Failed("boom");
        assert!(!failed.is_ok());
        assert_eq!(failed.error(), Some(&"boom"));
        assert_eq!(failed.map(|v| v + 1).into_result(), Err("boom"));
    }
}
