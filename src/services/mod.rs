pub(crate) mod attempts;
pub(crate) mod grading;
pub(crate) mod notifier;
pub(crate) mod sweeper;
pub(crate) mod windows;
