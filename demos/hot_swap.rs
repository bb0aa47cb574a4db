use std::time::Duration;

use interval_timer::Timer;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), interval_timer::TimerError> {
    let a: Box<dyn FnMut() + Send> = Box::new(|| println!("A"));

    // Calls `a` every second until stopped.
    let timer = Timer::repeating(a, Duration::from_millis(1000));
    println!("{timer}");
    timer.start()?;

    sleep(Duration::from_millis(2100)).await;
    timer.set_callable(Box::new(|| println!("B")));

    sleep(Duration::from_millis(2100)).await;
    timer.stop();
    println!("{timer}");
    println!("Timer statistics: {:?}", timer.statistics());

    // Expected output: A, A, B, B.
    Ok(())
}
