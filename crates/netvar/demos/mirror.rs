//! Mirror a small machine list and print every change the controller sends.
//!
//! Run with:
//!   cargo run --example mirror
//!
//! Import the printed GVL definition into the controller project, then
//! toggle `emergency` on the controller to see updates arrive.

use std::sync::Arc;
use std::time::Duration;

use netvar::frame::Value;
use netvar::list::{ChangeHandler, ClientConfig, Declaration, ListOptions, NetvarClient};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = NetvarClient::bind(ClientConfig::default())?;

    let on_change: ChangeHandler = Arc::new(|name: &str, value: &Value| {
        eprintln!("{name} = {value}");
    });
    let list = client.open_list_with_options(
        1,
        Declaration::new()
            .bool("emergency", 1, false)
            .word("working", 2, 0)
            .dword("counter", 3, 0),
        ListOptions::default().with_cyclic(Duration::from_secs(1)),
        Some(on_change),
    )?;

    println!("{}", client.definition(&list));

    let mut counter = 0i32;
    loop {
        std::thread::sleep(Duration::from_secs(1));
        counter = counter.wrapping_add(1);
        list.set("counter", Value::Dword(counter))?;
    }
}
