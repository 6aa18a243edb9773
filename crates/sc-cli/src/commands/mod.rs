pub(crate) mod contact;
pub(crate) mod key;
pub(crate) mod profile;
pub(crate) mod sync;
pub(crate) mod transfer;
