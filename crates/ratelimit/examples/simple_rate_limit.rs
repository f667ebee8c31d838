//! Books more permits than the burst holds on a bare bucket, then hands the
//! last booking back.

use paced_ratelimit::{Clock, Limit, Limiter, MonoClock};

fn main() {
    // 10 permits per second, 5 available up front
    let limit = match Limit::new(10.0) {
        Ok(limit) => limit,
        Err(e) => {
            eprintln!("Invalid limit: {}", e);
            return;
        }
    };
    let mut limiter = match Limiter::new(limit, 5, MonoClock) {
        Ok(limiter) => limiter,
        Err(e) => {
            eprintln!("Failed to create rate limiter: {}", e);
            return;
        }
    };

    println!("Configuration:");
    println!("  Rate limit: {} permits/second", limit.rate());
    println!("  Burst size: {} permits", limiter.burst());
    println!("Available tokens: {:.1}", limiter.tokens());

    let now = MonoClock.now();
    let mut last = None;
    for i in 1..=8 {
        match limiter.reserve_n_at(now, 1) {
            Ok(reservation) => {
                println!("reservation {}: act in {:?}", i, reservation.delay_from(now));
                last = Some(reservation);
            }
            Err(e) => println!("reservation {}: refused ({})", i, e),
        }
    }

    if let Some(reservation) = last {
        limiter.cancel_at(&reservation, now);
        println!(
            "Cancelled the last reservation, tokens now {:.1}",
            limiter.tokens_at(now)
        );
    }
}
