//! Register an `Arith` service and call it through an unreliable network.
//!
//! ```sh
//! RUST_LOG=simrpc=debug cargo run --example arith
//! ```

use simrpc::{Config, Network, Server};
use std::time::Duration;

struct Arith;

#[simrpc::service]
impl Arith {
    #[rpc(name = "Multiply")]
    pub fn multiply(&self, (a, b): (i64, i64), reply: &mut i64) {
        *reply = a * b;
    }

    #[rpc(name = "Divide")]
    pub fn divide(&self, (a, b): (i64, i64), reply: &mut Option<i64>) {
        *reply = a.checked_div(b);
    }

    /// Not callable: it returns its result instead of filling a reply slot.
    pub fn square(&self, a: i64) -> i64 {
        a * a
    }
}

#[tokio::main]
async fn main() {
    simrpc::init_logger();

    let config = Config {
        reliable: false,
        seed: Some(2024),
        ..Config::default()
    };
    println!("network config:\n{config}");
    let net = Network::with_config(config);

    let table = simrpc::register(Arith);
    println!(
        "Arith methods: {:?}, square of 9 stays local: {}",
        table.method_names(),
        Arith.square(9)
    );
    let server = Server::new();
    server.add_service(table);
    net.add_server("arith", server);
    let end = net.create_client("client");
    net.connect("client", "arith");
    net.enable("client", true);

    for (a, b) in [(6i64, 7i64), (12, 4), (1, 0)] {
        // retry until the network lets the call through
        let mut product = 0i64;
        let mut tries = 1;
        while !end.call("Arith.Multiply", &(a, b), &mut product).await {
            tries += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut quotient: Option<i64> = None;
        while !end.call("Arith.Divide", &(a, b), &mut quotient).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        println!("{a} * {b} = {product} ({tries} tries), {a} / {b} = {quotient:?}");
    }

    println!("{:#?}", net.stat());
    net.shutdown();
}
