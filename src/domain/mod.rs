// Domain 層：共用模型與 ports，不依賴 web 框架

pub mod model;
pub mod ports;
