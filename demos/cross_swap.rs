use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use interval_timer::{Timer, TimerMode};
use tokio::time::sleep;

type Callable = Box<dyn FnMut() + Send>;

fn f1() -> Callable {
    Box::new(|| println!("f1"))
}

fn f2() -> Callable {
    Box::new(|| println!("f2"))
}

#[tokio::main]
async fn main() -> Result<(), interval_timer::TimerError> {
    let t1 = Arc::new(Timer::from_millis(f1(), 500, TimerMode::Repeating));

    // Every second, t2 flips the function t1 calls.
    let flipped = AtomicBool::new(false);
    let target = Arc::clone(&t1);
    let t2 = Timer::from_millis(
        move || {
            let was_flipped = flipped.fetch_xor(true, Ordering::SeqCst);
            target.set_callable(if was_flipped { f1() } else { f2() });
        },
        1000,
        TimerMode::Repeating,
    );

    println!("{t1}");
    t1.start()?;
    println!("{t2}");
    t2.start()?;

    sleep(t1.interval() * 10).await;
    t2.stop();
    t1.stop();
    Ok(())
}
