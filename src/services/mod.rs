pub mod reconciler;
pub mod storage;
pub mod validation;
