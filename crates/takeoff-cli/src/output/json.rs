use serde::Serialize;
use takeoff_core::error::TakeoffError;

pub fn print<T: Serialize>(value: &T) -> Result<(), TakeoffError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
