use std::collections::HashMap;

use courier_domain::Localizer;

/// 内存消息目录
///
/// 模板用 {0}、{1} 占位参数。未命中返回 None，
/// 回退策略（首个参数或代码本身）由批注聚合器负责。
pub struct CatalogLocalizer {
    catalog: HashMap<String, String>,
}

impl CatalogLocalizer {
    pub fn new() -> Self {
        Self {
            catalog: HashMap::new(),
        }
    }

    pub fn with_messages<I, K, V>(messages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            catalog: messages
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, code: K, template: V) {
        self.catalog.insert(code.into(), template.into());
    }
}

impl Default for CatalogLocalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Localizer for CatalogLocalizer {
    fn localize(&self, code: &str, args: &[&str]) -> Option<String> {
        self.catalog.get(code).map(|template| {
            let mut message = template.clone();
            for (i, arg) in args.iter().enumerate() {
                message = message.replace(&format!("{{{i}}}"), arg);
            }
            message
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let localizer = CatalogLocalizer::with_messages([
            ("ORDER_MISSING", "订单 {0} 不存在"),
            ("RANGE", "值必须在 {0} 和 {1} 之间"),
        ]);

        assert_eq!(
            localizer.localize("ORDER_MISSING", &["42"]),
            Some("订单 42 不存在".to_string())
        );
        assert_eq!(
            localizer.localize("RANGE", &["1", "10"]),
            Some("值必须在 1 和 10 之间".to_string())
        );
        assert_eq!(localizer.localize("UNKNOWN", &["x"]), None);
    }

    #[test]
    fn test_insert_after_construction() {
        let mut localizer = CatalogLocalizer::new();
        assert_eq!(localizer.localize("400", &[]), None);
        localizer.insert("400", "请求参数错误");
        assert_eq!(localizer.localize("400", &[]), Some("请求参数错误".to_string()));
    }
}
