//! 缓存键：工具名 + 规范化参数编码的 blake3 指纹
//!
//! 规范化：对象键按字典序递归排序，语义相同但键顺序不同的参数得到相同的键。

use serde_json::Value;

/// 规范化 JSON 编码（对象键递归排序，无多余空白）
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// 计算缓存键：`tool:<name>:<blake3(canonical args) 前 32 位十六进制>`
pub fn cache_key(tool_name: &str, args: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(canonical_json(args).as_bytes());
    let digest = hasher.finalize().to_hex();
    format!("tool:{}:{}", tool_name, &digest[..32])
}
