//! 传输模式判定：按文件名推断 MIME 类型，决定文本或二进制传输

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 传输模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// 文本模式，传输客户端会做换行转换
    Text,
    /// 二进制模式，原样传输
    Binary,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Text => write!(f, "Text"),
            TransferMode::Binary => write!(f, "Binary"),
        }
    }
}

/// 一个类型推断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeClass {
    pub name: String,
    pub binary: bool,
}

/// 文件类型推断接口
pub trait TypeInference: Send + Sync {
    /// 返回文件名对应的零个或多个类型
    fn classify(&self, file_name: &str) -> Vec<TypeClass>;
}

/// 基于 mime_guess 扩展名表的推断
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeInference;

/// 以文本形式编码的 application/* 子类型
const TEXTUAL_SUBTYPES: &[&str] = &[
    "json",
    "xml",
    "javascript",
    "ecmascript",
    "x-javascript",
    "x-sh",
    "x-csh",
    "x-perl",
    "x-python",
    "x-ruby",
    "x-tex",
    "x-latex",
    "x-httpd-php",
    "x-yaml",
    "yaml",
    "toml",
    "sql",
    "rtf",
    "x-troff",
];

fn is_textual(type_: &str, subtype: &str, suffix: Option<&str>) -> bool {
    if type_ == "text" {
        return true;
    }
    if matches!(suffix, Some("json") | Some("xml")) {
        return true;
    }
    type_ == "application" && TEXTUAL_SUBTYPES.contains(&subtype)
}

impl TypeInference for MimeInference {
    fn classify(&self, file_name: &str) -> Vec<TypeClass> {
        mime_guess::from_path(Path::new(file_name))
            .iter()
            .map(|mime| {
                let binary = !is_textual(
                    mime.type_().as_str(),
                    mime.subtype().as_str(),
                    mime.suffix().map(|s| s.as_str()),
                );
                TypeClass {
                    name: mime.essence_str().to_string(),
                    binary,
                }
            })
            .collect()
    }
}

/// 决定传输模式
///
/// 无法推断类型时按二进制处理；任一候选类型为二进制即按二进制处理，
/// 只有全部候选都是文本类型时才使用文本模式。
pub fn transfer_mode(inference: &dyn TypeInference, file_name: &str) -> TransferMode {
    let classes = inference.classify(file_name);
    if classes.is_empty() || classes.iter().any(|c| c.binary) {
        TransferMode::Binary
    } else {
        TransferMode::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(name: &str) -> TransferMode {
        transfer_mode(&MimeInference, name)
    }

    #[test]
    fn test_text_types() {
        assert_eq!(mode("a.txt"), TransferMode::Text);
        assert_eq!(mode("index.html"), TransferMode::Text);
        assert_eq!(mode("style.css"), TransferMode::Text);
        assert_eq!(mode("data.json"), TransferMode::Text);
        assert_eq!(mode("feed.xml"), TransferMode::Text);
        assert_eq!(mode("dir/report.csv"), TransferMode::Text);
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(mode("b.bin"), TransferMode::Binary);
        assert_eq!(mode("photo.png"), TransferMode::Binary);
        assert_eq!(mode("archive.zip"), TransferMode::Binary);
        assert_eq!(mode("doc.pdf"), TransferMode::Binary);
    }

    #[test]
    fn test_unknown_type_is_binary() {
        assert!(MimeInference.classify("Makefile").is_empty());
        assert_eq!(mode("Makefile"), TransferMode::Binary);
        assert_eq!(mode("file.zzunknownext"), TransferMode::Binary);
    }

    struct Fixed(Vec<TypeClass>);

    impl TypeInference for Fixed {
        fn classify(&self, _file_name: &str) -> Vec<TypeClass> {
            self.0.clone()
        }
    }

    #[test]
    fn test_any_binary_candidate_wins() {
        let mixed = Fixed(vec![
            TypeClass {
                name: "text/x-typescript".to_string(),
                binary: false,
            },
            TypeClass {
                name: "video/mp2t".to_string(),
                binary: true,
            },
        ]);
        assert_eq!(transfer_mode(&mixed, "x.ts"), TransferMode::Binary);

        let text = Fixed(vec![TypeClass {
            name: "text/plain".to_string(),
            binary: false,
        }]);
        assert_eq!(transfer_mode(&text, "x"), TransferMode::Text);
    }
}
