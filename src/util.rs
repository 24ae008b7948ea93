/*!

  Utils for testing circuits.

*/

/// Compare Verilog as strings up to indentation and trailing blank lines.
#[macro_export]
macro_rules! assert_verilog_eq {
    ($left:expr, $right:expr $(,)?) => {
        $crate::assert_verilog_eq!($left, $right, "rendered Verilog differs")
    };
    ($left:expr, $right:expr, $($arg:tt)+) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                let left_lines: Vec<&str> = left_val
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                let right_lines: Vec<&str> = right_val
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                assert_eq!(left_lines, right_lines, $($arg)+);
            }
        }
    };
}
