//! # conflate demo application
//!
//! A sample program showing the three configuration channels. This is
//! **not** a real app — it exists to demonstrate and manually exercise
//! conflate's features.
//!
//! ## Running
//!
//! Passing configuration via the program arguments:
//!
//! ```sh
//! cargo run --example conflate_demo -- --msg 'hello! (from the arguments)'
//! ```
//!
//! Passing configuration via the environment:
//!
//! ```sh
//! CONFLATE_DEMO_MSG='hello! (from the environment)' cargo run --example conflate_demo
//! ```
//!
//! Passing configuration via a configuration file:
//!
//! ```sh
//! echo 'msg: hello! (from the config file)' > /tmp/demo.yml
//! cargo run --example conflate_demo -- --config-file /tmp/demo.yml
//! ```

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Config {
    msg: String,
    #[serde(rename = "wait")]
    delay: conflate::Duration,
}

fn main() {
    let mut config = Config {
        msg: "default".to_string(),
        delay: std::time::Duration::ZERO.into(),
    };

    let args = conflate::load(&mut config);

    std::thread::sleep(config.delay.into());
    println!("[conflate_demo] {}", config.msg);
    if !args.is_empty() {
        println!("[conflate_demo] leftover arguments: {args:?}");
    }
}
