#[macro_export]
macro_rules! or_continue {
    ($res:expr) => {
        match $res {
            Ok(res) => res,
            Err(e) => {
                tracing::info!("{} failed due to {:?}", stringify!($res), e);
                continue;
            }
        }
    };
}
