//! The public error type and the thread-local "last error" convenience slot that sits on top of
//! it, mirroring the historical `getlasterror()` accessor while every API here already returns a
//! proper `Result`.

use std::cell::RefCell;

use thiserror::Error;

/// Major error categories, each carrying the minor code it was constructed with.
///
/// `code()` reproduces the legacy `major * 1000 + minor` scheme for callers that still want a
/// single integer to log or compare against.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
	#[error("connection setup failed: {reason}")]
	ConnSetup { minor: u32, reason: String },

	#[error("connection failure: {reason}")]
	ConnFail { minor: u32, reason: String },

	#[error("resource error: {reason}")]
	Resource { minor: u32, reason: String },

	#[error("file system error: {reason}")]
	File { minor: u32, reason: String },

	#[error("invalid operation: {reason}")]
	InvOp { minor: u32, reason: String },

	#[error("asynchronous operation failure: {reason}")]
	AsyncFail { minor: u32, reason: String },
}

impl Error {
	pub fn code(&self) -> u32 {
		let (major, minor) = match self {
			Error::ConnSetup { minor, .. } => (1, *minor),
			Error::ConnFail { minor, .. } => (2, *minor),
			Error::Resource { minor, .. } => (3, *minor),
			Error::File { minor, .. } => (4, *minor),
			Error::InvOp { minor, .. } => (5, *minor),
			Error::AsyncFail { minor, .. } => (6, *minor),
		};

		major * 1000 + minor
	}

	pub fn conn_setup(minor: u32, reason: impl Into<String>) -> Self {
		Error::ConnSetup { minor, reason: reason.into() }
	}

	pub fn conn_fail(minor: u32, reason: impl Into<String>) -> Self {
		Error::ConnFail { minor, reason: reason.into() }
	}

	pub fn resource(minor: u32, reason: impl Into<String>) -> Self {
		Error::Resource { minor, reason: reason.into() }
	}

	pub fn file(minor: u32, reason: impl Into<String>) -> Self {
		Error::File { minor, reason: reason.into() }
	}

	pub fn inv_op(minor: u32, reason: impl Into<String>) -> Self {
		Error::InvOp { minor, reason: reason.into() }
	}

	pub fn async_fail(minor: u32, reason: impl Into<String>) -> Self {
		Error::AsyncFail { minor, reason: reason.into() }
	}
}

pub type Result<T> = std::result::Result<T, Error>;

thread_local! {
	static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// Record `err` as this thread's last error and return it unchanged, so call sites can write
/// `foo().map_err(record_last_error)?`.
pub fn record_last_error(err: Error) -> Error {
	LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.clone()));
	err
}

/// The last error recorded on this thread by [`record_last_error`], if any.
pub fn last_error() -> Option<Error> {
	LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_last_error() {
	LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn code_reproduces_major_minor_scheme() {
		let err = Error::conn_fail(4, "broken pipe");
		assert_eq!(err.code(), 2004);
	}

	#[test]
	fn last_error_round_trips_on_this_thread() {
		clear_last_error();
		assert_eq!(last_error(), None);

		let err = Error::resource(1, "out of buffers");
		record_last_error(err.clone());
		assert_eq!(last_error(), Some(err));

		clear_last_error();
		assert_eq!(last_error(), None);
	}
}
