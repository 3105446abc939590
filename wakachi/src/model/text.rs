//! モデルのテキスト形式
//!
//! 1行に1つのレコードを空白区切りで書きます。文字列中の空白と制御文字は
//! エスケープされます。
//!
//! - `\\`: バックスラッシュ
//! - `\s`: 空白
//! - `\uXXXX`: 制御文字と対になっていないサロゲート
//! - `\e`: 空文字列
//!
//! 実数は [`f64`] の `Display` 表現で書かれ、読み戻したときに同じ値になります。
use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::dictionary::{MAX_DICTIONARIES, PatternDictionary, ProbTagEntry, WordEntry};
use crate::errors::{Result, WakachiError};
use crate::lm::{LanguageModel, NgramTable};
use crate::model::linear::{LinearModel, SolverKind};
use crate::model::{Model, ModelParams, TagModel};
use crate::string::{TokenChar, TokenString};
use crate::unknown::UnknownEstimator;

/// テキスト形式の先頭行
pub const TEXT_HEADER: &str = "WakachiModel text 0.1";

/// 文字列を1つのフィールドとして書ける形にエスケープします。
pub fn escape(s: &TokenString) -> String {
    if s.is_empty() {
        return "\\e".to_string();
    }
    let mut out = String::with_capacity(s.len());
    for c in s.iter() {
        match c {
            0x5C => out.push_str("\\\\"),
            0x20 => out.push_str("\\s"),
            0x00..=0x1F | 0x7F..=0x9F | 0xD800..=0xDFFF => {
                out.push_str(&format!("\\u{:04X}", c));
            }
            _ => match char::from_u32(u32::from(c)) {
                Some(ch) => out.push(ch),
                None => out.push_str(&format!("\\u{:04X}", c)),
            },
        }
    }
    out
}

/// [`escape`] で書かれたフィールドを文字列に戻します。
///
/// # エラー
///
/// 不正なエスケープを含む場合は [`WakachiError`] を返します。
pub fn unescape(field: &str) -> Result<TokenString> {
    if field == "\\e" {
        return Ok(TokenString::default());
    }
    let mut out: Vec<TokenChar> = Vec::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 2];
            out.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        match chars.next() {
            Some('\\') => out.push(0x5C),
            Some('s') => out.push(0x20),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = (hex.len() == 4)
                    .then(|| u16::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .ok_or_else(|| {
                        WakachiError::invalid_format("field", format!("bad escape in {}", field))
                    })?;
                out.push(code);
            }
            _ => {
                return Err(WakachiError::invalid_format(
                    "field",
                    format!("bad escape in {}", field),
                ));
            }
        }
    }
    Ok(TokenString::new(out))
}

/// 行番号を数えながらレコードを読み込むリーダー
pub struct TextReader<R> {
    rdr: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> TextReader<R> {
    /// 新しいリーダーを作成します。
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// 最後に読んだ行の番号を返します。
    pub const fn line_no(&self) -> usize {
        self.line_no
    }

    /// 現在の行に位置情報を付けた書式エラーを作ります。
    pub fn error<S: AsRef<str>>(&self, msg: S) -> WakachiError {
        WakachiError::invalid_format("rdr", format!("line {}: {}", self.line_no, msg.as_ref()))
    }

    /// 次の行をフィールドに分けて返します。
    ///
    /// # エラー
    ///
    /// 入力が終わっている場合は [`WakachiError`] を返します。
    pub fn record(&mut self) -> Result<Vec<String>> {
        self.buf.clear();
        if self.rdr.read_line(&mut self.buf)? == 0 {
            self.line_no += 1;
            return Err(self.error("unexpected end of input"));
        }
        self.line_no += 1;
        let line = self.buf.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Ok(vec![]);
        }
        Ok(line.split(' ').map(str::to_string).collect())
    }

    /// `keyword` で始まり、続くフィールドが `n` 個の行を読みます。
    ///
    /// # 戻り値
    ///
    /// キーワードを除いたフィールド
    pub fn expect(&mut self, keyword: &str, n: usize) -> Result<Vec<String>> {
        let mut fields = self.record()?;
        if fields.first().map(String::as_str) != Some(keyword) {
            return Err(self.error(format!("expected a `{}` record", keyword)));
        }
        fields.remove(0);
        if fields.len() != n {
            return Err(self.error(format!(
                "`{}` takes {} fields, got {}",
                keyword,
                n,
                fields.len()
            )));
        }
        Ok(fields)
    }

    /// 続くフィールドの数を問わずに `keyword` で始まる行を読みます。
    pub fn expect_any(&mut self, keyword: &str) -> Result<Vec<String>> {
        let mut fields = self.record()?;
        if fields.first().map(String::as_str) != Some(keyword) {
            return Err(self.error(format!("expected a `{}` record", keyword)));
        }
        fields.remove(0);
        Ok(fields)
    }

    /// フィールドを値に変換します。
    pub fn parse<T: FromStr>(&self, field: &str) -> Result<T> {
        field
            .parse()
            .map_err(|_| self.error(format!("cannot parse `{}`", field)))
    }

    /// フィールドを文字列に戻します。
    pub fn token(&self, field: &str) -> Result<TokenString> {
        unescape(field).map_err(|e| self.error(e.to_string()))
    }

    /// `0` または `1` のフラグを読みます。
    fn flag(&mut self, keyword: &str) -> Result<bool> {
        let f = self.expect(keyword, 1)?;
        self.parse_flag(keyword, &f[0])
    }

    /// フィールドを `0` または `1` のフラグとして解釈します。
    fn parse_flag(&self, name: &str, field: &str) -> Result<bool> {
        match field {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(self.error(format!("`{}` must be 0 or 1, got {}", name, other))),
        }
    }
}

/// テキスト形式で読み書きできる部品
pub trait TextSerialize: Sized {
    /// テキスト形式で書き出します。
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()>;

    /// テキスト形式から読み込みます。
    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self>;
}

fn write_floats<W: Write>(wtr: &mut W, values: &[f64]) -> Result<()> {
    for v in values {
        write!(wtr, " {}", v)?;
    }
    Ok(())
}

fn write_optional<W: Write, T: TextSerialize>(
    wtr: &mut W,
    keyword: &str,
    value: Option<&T>,
) -> Result<()> {
    match value {
        Some(v) => {
            writeln!(wtr, "{} 1", keyword)?;
            v.write_text(wtr)
        }
        None => Ok(writeln!(wtr, "{} 0", keyword)?),
    }
}

fn read_optional<R: BufRead, T: TextSerialize>(
    rdr: &mut TextReader<R>,
    keyword: &str,
) -> Result<Option<T>> {
    if rdr.flag(keyword)? {
        T::read_text(rdr).map(Some)
    } else {
        Ok(None)
    }
}

impl TextSerialize for LinearModel {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(
            wtr,
            "linear {} {} {}",
            self.solver().name(),
            self.labels().len(),
            self.num_features()
        )?;
        write!(wtr, "labels")?;
        for l in self.labels() {
            write!(wtr, " {}", l)?;
        }
        writeln!(wtr)?;
        write!(wtr, "biases")?;
        write_floats(wtr, self.biases())?;
        writeln!(wtr)?;
        for (name, weights) in self.features() {
            write!(wtr, "{}", escape(name))?;
            write_floats(wtr, weights)?;
            writeln!(wtr)?;
        }
        Ok(())
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("linear", 3)?;
        let solver = SolverKind::from_name(&head[0])
            .ok_or_else(|| rdr.error(format!("unknown solver: {}", head[0])))?;
        let num_labels: usize = rdr.parse(&head[1])?;
        let num_features: usize = rdr.parse(&head[2])?;
        let labels = rdr
            .expect("labels", num_labels)?
            .iter()
            .map(|f| rdr.parse(f))
            .collect::<Result<Vec<i32>>>()?;
        let biases = rdr
            .expect_any("biases")?
            .iter()
            .map(|f| rdr.parse(f))
            .collect::<Result<Vec<f64>>>()?;
        let mut features = Vec::with_capacity(num_features);
        for _ in 0..num_features {
            let fields = rdr.record()?;
            let Some((name, weights)) = fields.split_first() else {
                return Err(rdr.error("expected a feature record"));
            };
            let weights = weights
                .iter()
                .map(|f| rdr.parse(f))
                .collect::<Result<Vec<f64>>>()?;
            features.push((rdr.token(name)?, weights));
        }
        LinearModel::new(solver, labels, features, biases).map_err(|e| rdr.error(e.to_string()))
    }
}

impl TextSerialize for WordEntry {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(
            wtr,
            "entry {} {} {}",
            escape(self.word()),
            self.in_dict(),
            self.num_levels()
        )?;
        for level in 0..self.num_levels() {
            let tags = self.tags(level);
            writeln!(
                wtr,
                "tags {} {}",
                tags.len(),
                u8::from(self.tag_model(level).is_some())
            )?;
            for (i, tag) in tags.iter().enumerate() {
                writeln!(wtr, "{} {}", self.tag_dict_mask(level, i), escape(tag))?;
            }
            if let Some(model) = self.tag_model(level) {
                model.write_text(wtr)?;
            }
        }
        Ok(())
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("entry", 3)?;
        let mut entry = WordEntry::new(rdr.token(&head[0])?);
        entry.set_in_dict_mask(rdr.parse(&head[1])?);
        let num_levels: usize = rdr.parse(&head[2])?;
        for level in 0..num_levels {
            let f = rdr.expect("tags", 2)?;
            let num_tags: usize = rdr.parse(&f[0])?;
            let has_model = rdr.parse_flag("tags", &f[1])?;
            for _ in 0..num_tags {
                let fields = rdr.record()?;
                if fields.len() != 2 {
                    return Err(rdr.error("expected `<mask> <tag>`"));
                }
                let mask: u8 = rdr.parse(&fields[0])?;
                entry.push_tag_with_mask(level, rdr.token(&fields[1])?, mask);
            }
            if has_model {
                entry.set_tag_model(level, LinearModel::read_text(rdr)?);
            }
        }
        Ok(entry)
    }
}

impl TextSerialize for ProbTagEntry {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(wtr, "prob {} {}", escape(self.word()), self.len())?;
        for (tag, p) in self.iter() {
            writeln!(wtr, "{} {}", escape(tag), p)?;
        }
        Ok(())
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("prob", 2)?;
        let mut entry = ProbTagEntry::new(rdr.token(&head[0])?);
        let n: usize = rdr.parse(&head[1])?;
        for _ in 0..n {
            let fields = rdr.record()?;
            if fields.len() != 2 {
                return Err(rdr.error("expected `<tag> <log probability>`"));
            }
            entry.add_tag(rdr.token(&fields[0])?, rdr.parse(&fields[1])?);
        }
        Ok(entry)
    }
}

impl<E: TextSerialize> TextSerialize for PatternDictionary<E> {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(wtr, "dict {}", self.len())?;
        for (key, entry) in self.iter() {
            writeln!(wtr, "key {}", escape(key))?;
            entry.write_text(wtr)?;
        }
        Ok(())
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("dict", 1)?;
        let n: usize = rdr.parse(&head[0])?;
        let mut map = std::collections::BTreeMap::new();
        for _ in 0..n {
            let key = rdr.expect("key", 1)?;
            let key = rdr.token(&key[0])?;
            let entry = E::read_text(rdr)?;
            if map.insert(key.clone(), entry).is_some() {
                return Err(rdr.error(format!("duplicate key: {}", key)));
            }
        }
        PatternDictionary::from_map(map).map_err(|e| rdr.error(e.to_string()))
    }
}

fn write_table<W: Write>(wtr: &mut W, table: &NgramTable) -> Result<()> {
    for (key, value) in table.iter() {
        writeln!(wtr, "{} {}", escape(key), value)?;
    }
    Ok(())
}

fn read_table<R: BufRead>(rdr: &mut TextReader<R>, n: usize) -> Result<NgramTable> {
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let fields = rdr.record()?;
        if fields.len() != 2 {
            return Err(rdr.error("expected `<n-gram> <log probability>`"));
        }
        pairs.push((rdr.token(&fields[0])?, rdr.parse(&fields[1])?));
    }
    Ok(NgramTable::from_pairs(pairs))
}

impl TextSerialize for LanguageModel {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(
            wtr,
            "lm {} {} {} {}",
            self.n(),
            self.vocab_size(),
            self.probs().len(),
            self.fallbacks().len()
        )?;
        write_table(wtr, self.probs())?;
        write_table(wtr, self.fallbacks())
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("lm", 4)?;
        let n = rdr.parse(&head[0])?;
        let vocab_size = rdr.parse(&head[1])?;
        let num_probs = rdr.parse(&head[2])?;
        let num_fallbacks = rdr.parse(&head[3])?;
        let probs = read_table(rdr, num_probs)?;
        let fallbacks = read_table(rdr, num_fallbacks)?;
        LanguageModel::from_parts(n, vocab_size, probs, fallbacks)
            .map_err(|e| rdr.error(e.to_string()))
    }
}

impl TextSerialize for UnknownEstimator {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        self.subwords().write_text(wtr)?;
        self.lm().write_text(wtr)
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let subwords = PatternDictionary::read_text(rdr)?;
        let lm = LanguageModel::read_text(rdr)?;
        Ok(UnknownEstimator::new(subwords, lm))
    }
}

impl TextSerialize for TagModel {
    fn write_text<W: Write>(&self, wtr: &mut W) -> Result<()> {
        writeln!(wtr, "tags {}", self.tags().len())?;
        for tag in self.tags() {
            writeln!(wtr, "{}", escape(tag))?;
        }
        self.model().write_text(wtr)
    }

    fn read_text<R: BufRead>(rdr: &mut TextReader<R>) -> Result<Self> {
        let head = rdr.expect("tags", 1)?;
        let n: usize = rdr.parse(&head[0])?;
        let mut tags = Vec::with_capacity(n);
        for _ in 0..n {
            let fields = rdr.record()?;
            if fields.len() != 1 {
                return Err(rdr.error("expected a tag"));
            }
            tags.push(rdr.token(&fields[0])?);
        }
        let model = LinearModel::read_text(rdr)?;
        TagModel::new(tags, model).map_err(|e| rdr.error(e.to_string()))
    }
}

/// モデル全体をテキスト形式で書き出します。
pub(crate) fn write_model<W: Write>(model: &Model, mut wtr: W) -> Result<()> {
    let wtr = &mut wtr;
    writeln!(wtr, "{}", TEXT_HEADER)?;
    let p = model.params();
    writeln!(
        wtr,
        "params {} {} {} {} {} {}",
        p.char_window, p.char_n, p.type_window, p.type_n, p.dict_max_len, p.num_levels
    )?;
    writeln!(wtr, "dicts {}", model.dict_names().len())?;
    for name in model.dict_names() {
        writeln!(wtr, "{}", escape(&TokenString::from(name)))?;
    }
    write_optional(wtr, "words", model.words())?;
    write_optional(wtr, "boundary", model.boundary_model())?;
    writeln!(wtr, "levels {}", p.num_levels)?;
    for level in 0..p.num_levels {
        write_optional(wtr, "global", model.global_models().get(level).and_then(Option::as_ref))?;
        write_optional(
            wtr,
            "unknown",
            model.unknown_estimators().get(level).and_then(Option::as_ref),
        )?;
    }
    writeln!(wtr, "end")?;
    Ok(())
}

/// テキスト形式のモデルを読み込みます。参照表は構築しません。
pub(crate) fn read_model<R: BufRead>(rdr: R) -> Result<Model> {
    let mut rdr = TextReader::new(rdr);
    let header = rdr.record()?.join(" ");
    if header != TEXT_HEADER {
        return Err(rdr.error("not a text model; the header mismatches"));
    }
    let f = rdr.expect("params", 6)?;
    let params = ModelParams {
        char_window: rdr.parse(&f[0])?,
        char_n: rdr.parse(&f[1])?,
        type_window: rdr.parse(&f[2])?,
        type_n: rdr.parse(&f[3])?,
        dict_max_len: rdr.parse(&f[4])?,
        num_levels: rdr.parse(&f[5])?,
    };
    let f = rdr.expect("dicts", 1)?;
    let num_dicts: usize = rdr.parse(&f[0])?;
    if num_dicts > MAX_DICTIONARIES {
        return Err(rdr.error(format!(
            "{} dictionaries are declared, but at most {} are supported",
            num_dicts, MAX_DICTIONARIES
        )));
    }
    let mut dict_names = Vec::with_capacity(num_dicts);
    for _ in 0..num_dicts {
        let fields = rdr.record()?;
        if fields.len() != 1 {
            return Err(rdr.error("expected a dictionary name"));
        }
        dict_names.push(rdr.token(&fields[0])?.to_string());
    }
    let words = read_optional(&mut rdr, "words")?;
    let boundary = read_optional(&mut rdr, "boundary")?;
    let f = rdr.expect("levels", 1)?;
    let levels: usize = rdr.parse(&f[0])?;
    if levels != params.num_levels {
        return Err(rdr.error(format!(
            "{} levels follow, but the parameters declare {}",
            levels, params.num_levels
        )));
    }
    let mut global_models = Vec::with_capacity(levels);
    let mut unknown = Vec::with_capacity(levels);
    for _ in 0..levels {
        global_models.push(read_optional(&mut rdr, "global")?);
        unknown.push(read_optional(&mut rdr, "unknown")?);
    }
    rdr.expect("end", 0)?;
    log::info!(
        "read a text model at line {}: {} dictionaries, {} levels",
        rdr.line_no(),
        dict_names.len(),
        levels
    );
    Ok(Model::from_text_parts(
        params,
        dict_names,
        words,
        boundary,
        global_models,
        unknown,
    ))
}
