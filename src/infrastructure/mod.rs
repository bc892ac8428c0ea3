pub mod storage;
pub mod validator;
