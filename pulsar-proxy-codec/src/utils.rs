macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
}

/// Bytes taken by the `total_size` field
pub(crate) const TOTAL_SIZE_LEN: usize = 4;

/// Bytes taken by the `command_size` field
pub(crate) const COMMAND_SIZE_LEN: usize = 4;
