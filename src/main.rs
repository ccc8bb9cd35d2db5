use osprey_engine::runtime;
use osprey_engine::Runtime;

fn main() {
    let mut rt = match Runtime::new(".") {
        Ok(rt) => rt,
        Err(err) => runtime::fatal(&err),
    };
    if let Err(err) = rt.run() {
        runtime::fatal(&err);
    }
}
