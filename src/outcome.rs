use crate::GatewayError;

/// A value that is always usable, plus the error that forced a fallback.
///
/// Used where a stage is allowed to degrade instead of failing the request
/// (prompt translation, vectorization). The fallback path is explicit in the
/// type; there is no error to catch and ignore.
#[derive(Debug)]
pub struct BestEffort<T> {
    value: T,
    soft_failure: Option<GatewayError>,
}

impl<T> BestEffort<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            soft_failure: None,
        }
    }

    pub fn degraded(fallback: T, error: GatewayError) -> Self {
        Self {
            value: fallback,
            soft_failure: Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.soft_failure.is_some()
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn soft_failure(&self) -> Option<&GatewayError> {
        self.soft_failure.as_ref()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Option<GatewayError>) {
        (self.value, self.soft_failure)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BestEffort<U> {
        BestEffort {
            value: f(self.value),
            soft_failure: self.soft_failure,
        }
    }
}

impl<T> From<T> for BestEffort<T> {
    fn from(value: T) -> Self {
        Self::ok(value)
    }
}
