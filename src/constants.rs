pub const DEFAULT_MAX_BIN: u16 = 256;
// A column holds at most max_bin + 1 distinct cuts plus the f64::MAX sentinel.
pub const MAX_BIN_LIMIT: u16 = u16::MAX - 2;
pub const HESSIAN_EPS: f64 = 1e-6;
pub const MAX_CATEGORY_CODE: u32 = u16::MAX as u32 - 2;
pub const DEFAULT_MAX_CAT_TO_ONEHOT: usize = 4;
pub const RANK_HESSIAN_EPS: f64 = 1e-16;
pub const LOGIT_EPS: f64 = 1e-6;
