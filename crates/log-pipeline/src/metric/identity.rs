//! 시계열 식별자 -- 메트릭 이름과 정렬된 라벨 집합의 SHA-256 다이제스트
//!
//! 정규형 문자열은 `name{k1="v1",k2="v2"}` 형태입니다. 라벨은 이름순으로
//! 정렬되고 값은 `\\`, `\"`, `\n` 으로 이스케이프되므로 서로 다른 라벨 매핑이
//! 같은 정규형을 갖지 않습니다.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

/// 정렬된 라벨 집합
///
/// 선언 순서와 무관하게 항상 이름순으로 순회합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// 빈 라벨 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 라벨을 추가합니다. 같은 이름이 이미 있으면 `false`를 반환하고 기존 값을 유지합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        use std::collections::btree_map::Entry;
        match self.0.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    /// 이름으로 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 이름순으로 (이름, 값)을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// 라벨 값 이스케이프 (exposition 형식과 동일한 규칙)
pub(crate) fn escape_label_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

/// 정규형 descriptor 문자열을 만듭니다.
pub fn canonical_descriptor(name: &str, labels: &LabelSet) -> String {
    let mut out = String::with_capacity(name.len() + 2 + labels.len() * 16);
    out.push_str(name);
    out.push('{');
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push_str("=\"");
        escape_label_value(v, &mut out);
        out.push('"');
    }
    out.push('}');
    out
}

/// 시계열 식별자 (SHA-256, 32바이트)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesIdentity([u8; 32]);

impl SeriesIdentity {
    /// 메트릭 이름과 라벨 집합으로부터 식별자를 계산합니다.
    pub fn of(name: &str, labels: &LabelSet) -> Self {
        Self::from_descriptor(&canonical_descriptor(name, labels))
    }

    /// 이미 정규화된 descriptor 문자열의 다이제스트
    pub fn from_descriptor(descriptor: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(descriptor.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SeriesIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SeriesIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 앞 8바이트만 표시
        write!(f, "SeriesIdentity({}…)", hex::encode(&self.0[..8]))
    }
}
