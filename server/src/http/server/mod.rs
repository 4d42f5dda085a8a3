//! Router assembly and the tower middleware stack.

#[macro_export]
macro_rules! cfg_if_expr {
    (
        #[cfg($condition: meta)]
        $true_block: expr,
        #[cfg(not)]
        $false_block: expr,
    ) => {{
        #[cfg($condition)]
        let _return = $true_block;
        #[cfg(not($condition))]
        let _return = $false_block;
        _return
    }};
}

pub mod middleware;
pub mod router;
