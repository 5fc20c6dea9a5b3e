//! The write-once value a [`super::Future`] resolves to. Named `Outcome`
//! rather than `Result` to avoid shadowing `std::result::Result` at
//! every call site.

use crate::err::Error;

enum Repr<T> {
	Success(T),
	Failure(Error),
}

/// Exactly one of a success value or an error, never both.
pub struct Outcome<T>(Repr<T>);

impl<T> Outcome<T> {
	pub fn success(value: T) -> Self {
		Self(Repr::Success(value))
	}

	pub fn failure(error: Error) -> Self {
		Self(Repr::Failure(error))
	}

	pub fn is_success(&self) -> bool {
		matches!(self.0, Repr::Success(_))
	}

	pub fn is_failure(&self) -> bool {
		matches!(self.0, Repr::Failure(_))
	}

	/// The success value, or panics if this outcome is a failure.
	pub fn unwrap_success(self) -> T {
		match self.0 {
			Repr::Success(v) => v,
			Repr::Failure(e) => panic!("Outcome::unwrap_success() called on a failure: {e}"),
		}
	}

	/// The error, or panics if this outcome is a success.
	pub fn unwrap_failure(self) -> Error {
		match self.0 {
			Repr::Failure(e) => e,
			Repr::Success(_) => panic!("Outcome::unwrap_failure() called on a success"),
		}
	}

	/// Both fields at once, by reference, for inspection without
	/// consuming the outcome.
	pub fn get(&self) -> (Option<&T>, Option<&Error>) {
		match &self.0 {
			Repr::Success(v) => (Some(v), None),
			Repr::Failure(e) => (None, Some(e)),
		}
	}

	/// Converts to a plain `std::result::Result`, the natural shape for
	/// `?`-propagation once a caller has decided to stop treating success
	/// and failure symmetrically.
	pub fn into_result(self) -> Result<T, Error> {
		match self.0 {
			Repr::Success(v) => Ok(v),
			Repr::Failure(e) => Err(e),
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
		match self.0 {
			Repr::Success(v) => f(v),
			Repr::Failure(e) => Outcome::failure(e),
		}
	}
}

impl<T> From<Result<T, Error>> for Outcome<T> {
	fn from(r: Result<T, Error>) -> Self {
		match r {
			Ok(v) => Outcome::success(v),
			Err(e) => Outcome::failure(e),
		}
	}
}

impl<T: Clone> Clone for Outcome<T> {
	fn clone(&self) -> Self {
		match &self.0 {
			Repr::Success(v) => Outcome::success(v.clone()),
			Repr::Failure(e) => Outcome::failure(e.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn success_and_failure_round_trip() {
		let ok: Outcome<i32> = Outcome::success(7);
		assert!(ok.is_success());
		assert_eq!(ok.unwrap_success(), 7);

		let err: Outcome<i32> = Outcome::failure(Error::Cancelled);
		assert!(err.is_failure());
		assert!(err.unwrap_failure().is_cancelled());
	}

	#[test]
	#[should_panic(expected = "called on a failure")]
	fn success_panics_on_failure() {
		let err: Outcome<i32> = Outcome::failure(Error::Cancelled);
		err.unwrap_success();
	}
}
