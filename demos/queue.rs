//! A small queueing shop: customers arrive with exponential inter-arrival
//! times and pass through a single server with per-customer service times.
//! The waiting room is finite; customers who find it full balk and leave.

use devs::prelude::*;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

/// How many customers fit in the waiting room, the one in service aside.
const WAITING_ROOM: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Customer {
    id: usize,
    service_time: f64,
}

#[derive(Debug, Clone)]
struct Shop {
    waiting: VecDeque<Customer>,
    in_service: Option<Customer>,
    /// Remaining service time of the current customer; infinite when idle.
    sigma: f64,
    served: usize,
    balked: usize,
}

impl Shop {
    fn idle() -> Self {
        Self {
            waiting: VecDeque::new(),
            in_service: None,
            sigma: f64::INFINITY,
            served: 0,
            balked: 0,
        }
    }
}

fn shop(capacity: usize, balked_probe: Rc<Cell<usize>>) -> Atomic<Customer, usize, Shop> {
    Atomic::new(
        Shop::idle(),
        move |shop: &Shop, elapsed: SimTime, customer: &Customer| {
            let mut next = shop.clone();
            if next.in_service.is_some() {
                next.sigma -= elapsed.as_f64();
                if next.waiting.len() < capacity {
                    next.waiting.push_back(*customer);
                } else {
                    next.balked += 1;
                    balked_probe.set(next.balked);
                }
            } else {
                next.in_service = Some(*customer);
                next.sigma = customer.service_time;
            }
            next
        },
        |shop: &Shop| {
            let mut next = shop.clone();
            if next.in_service.take().is_some() {
                next.served += 1;
            }
            next.in_service = next.waiting.pop_front();
            next.sigma = next
                .in_service
                .map_or(f64::INFINITY, |c| c.service_time);
            next
        },
        |shop: &Shop| shop.in_service.map_or(0, |c| c.id),
        |shop: &Shop| SimTime::new(shop.sigma),
    )
}

fn main() -> SimResult<()> {
    let end_time = 100.0;
    let mut rng = Random::seeded(2023);
    let balked = Rc::new(Cell::new(0_usize));

    let model = Compound::new()
        .component("shop", shop(WAITING_ROOM, Rc::clone(&balked)))
        .input("shop", None)
        .output("shop", None);

    let sim = Builder::new()
        .start_time(0.0)
        .end_time(end_time)
        .printer(VerbosePrinter::new())
        .build("queue system", model)?;

    // Arrivals are precomputed and injected as external inputs, so the
    // model itself stays deterministic.
    let mut at = rng.exponential(0.5);
    let mut arrivals = 0;
    while at < end_time {
        arrivals += 1;
        let customer = Customer {
            id: arrivals,
            service_time: rng.uniform(0.5, 3.0),
        };
        sim.schedule_external_input(at, Dynamic::wrap(customer), "customer arrival")?;
        at += rng.exponential(0.5);
    }

    let served = Rc::new(Cell::new(0_usize));
    let probe = Rc::clone(&served);
    sim.add_output_listener(Rc::new(move |_name, _time, value| {
        if value.try_cast_ref::<usize>().is_some() {
            probe.set(probe.get() + 1);
        }
    }));

    let summary = sim.run()?;
    println!(
        "{arrivals} customers arrived, {} were served, {} balked at the full waiting room",
        served.get(),
        balked.get()
    );
    println!("{summary}");
    Ok(())
}
