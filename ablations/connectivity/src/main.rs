//! 比较两种扩展邻域 (6 个面邻居 / 26 个邻居) 下的 Fast Marching 分割.
//!
//! 扫描和种子标签的路径见 `utils::loader`.

mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();
    runner::run().analyze();
}
