//! Intercept a failing function.
//!
//! ```sh
//! OPENAI_API_KEY=sk-... cargo run -p self-debug-core --example divide
//! ```

use self_debug_core::{Console, CoreError, DebugSession, SessionConfig, Settings, target};

#[derive(Debug, thiserror::Error)]
enum MathError {
    #[error("attempt to divide {0} by zero")]
    DivisionByZero(i32),
}

fn divide(a: i32, b: i32) -> Result<i32, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero(a));
    }
    Ok(a / b)
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let settings = Settings::load(&SessionConfig::builder().build())?;
    let session = DebugSession::from_settings(&settings, Console::stdout())?;
    let divide = session.intercept(target!(divide));

    match divide.call((10, 2)).await {
        Ok(value) => println!("10 / 2 = {value:?}"),
        Err(e) => println!("error: {e}"),
    }
    match divide.call((10, 0)).await {
        Ok(Some(value)) => println!("10 / 0 = {value}"),
        Ok(None) => println!("failure analyzed above"),
        Err(e) => println!("error propagated: {e}"),
    }
    Ok(())
}
