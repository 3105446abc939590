//! 解析モデル
//!
//! 単語辞書、境界推定の分類器、タグレベルごとの大域分類器と未知語推定器をまとめ、
//! バイナリ形式とテキスト形式で読み書きします。
//!
//! バイナリ形式はマジックバイトと16バイト境界までの詰め物に続く rkyv のアーカイブです。
//! 参照表もそのまま格納されるため、読み込み後すぐに解析できます。
//! テキスト形式は分類器の重みを素性名とともに保持し、読み込み時に参照表を構築します。
pub mod feature_name;
pub mod linear;
pub mod lookup;
pub mod text;

use std::fs::File;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use memmap2::Mmap;
use rkyv::api::serialize_using;
use rkyv::rancor::Error;
use rkyv::ser::Serializer;
use rkyv::ser::allocator::Arena;
use rkyv::ser::sharing::Share;
use rkyv::ser::writer::IoWriter;
use rkyv::util::{AlignedVec, with_arena};
use rkyv::{Archive, Deserialize, Serialize, from_bytes};

use crate::dictionary::{DictionaryBuilder, MAX_DICTIONARIES, PatternDictionary, WordEntry};
use crate::errors::{Result, WakachiError};
use crate::model::linear::LinearModel;
use crate::model::lookup::FeatureLookup;
use crate::string::TokenString;
use crate::unknown::UnknownEstimator;

/// バイナリ形式のモデルを識別するマジックバイト
///
/// `float-weights` フィーチャーの有無で参照表の数値表現が異なるため、
/// マジックバイトも区別されます。
#[cfg(not(feature = "float-weights"))]
pub const MODEL_MAGIC: &[u8] = b"WakachiModel 0.1\n";

/// バイナリ形式のモデルを識別するマジックバイト
#[cfg(feature = "float-weights")]
pub const MODEL_MAGIC: &[u8] = b"WakachiModelF 0.1\n";

const MODEL_MAGIC_LEN: usize = MODEL_MAGIC.len();
const RKYV_ALIGNMENT: usize = 16;
const PADDING_LEN: usize = (RKYV_ALIGNMENT - (MODEL_MAGIC_LEN % RKYV_ALIGNMENT)) % RKYV_ALIGNMENT;
const DATA_START: usize = MODEL_MAGIC_LEN + PADDING_LEN;

/// 素性の形を決めるパラメータ
#[derive(Clone, Debug, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ModelParams {
    /// 文字 n-gram の窓幅
    pub char_window: usize,
    /// 文字 n-gram の最大長
    pub char_n: usize,
    /// 文字種 n-gram の窓幅
    pub type_window: usize,
    /// 文字種 n-gram の最大長
    pub type_n: usize,
    /// 辞書素性で区別する単語長の上限
    pub dict_max_len: usize,
    /// タグレベルの数
    pub num_levels: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            char_window: 3,
            char_n: 3,
            type_window: 3,
            type_n: 3,
            dict_max_len: 4,
            num_levels: 0,
        }
    }
}

/// タグ付けの大域分類器とそのタグ集合
#[derive(Clone, Debug, PartialEq, Archive, Serialize, Deserialize)]
pub struct TagModel {
    tags: Vec<TokenString>,
    model: LinearModel,
}

impl TagModel {
    /// 新しい大域分類器を作成します。
    ///
    /// # エラー
    ///
    /// 分類器のラベルがタグの添字として範囲外の場合は [`WakachiError`] を返します。
    pub fn new(tags: Vec<TokenString>, model: LinearModel) -> Result<Self> {
        if let Some(&l) = model
            .labels()
            .iter()
            .find(|&&l| usize::try_from(l).map_or(true, |l| l >= tags.len()))
        {
            return Err(WakachiError::invalid_argument(
                "model",
                format!("label {} does not index one of {} tags", l, tags.len()),
            ));
        }
        Ok(Self { tags, model })
    }

    /// タグ集合を返します。
    pub fn tags(&self) -> &[TokenString] {
        &self.tags
    }

    /// 分類器を返します。
    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// ラベル `i` のタグを返します。
    pub fn tag_of_label(&self, i: usize) -> Option<&TokenString> {
        let label = usize::try_from(*self.model.labels().get(i)?).ok()?;
        self.tags.get(label)
    }
}

/// 解析モデル
#[derive(Clone, Debug, Archive, Serialize, Deserialize)]
pub struct Model {
    params: ModelParams,
    dict_names: Vec<String>,
    words: Option<PatternDictionary<WordEntry>>,
    boundary_model: Option<LinearModel>,
    boundary_lookup: Option<FeatureLookup>,
    global_models: Vec<Option<TagModel>>,
    global_lookups: Vec<Option<FeatureLookup>>,
    unknown: Vec<Option<UnknownEstimator>>,
}

impl Model {
    /// 分類器の重みから参照表を構築します。
    ///
    /// 読み込み時には自動で呼ばれます。モデルを組み立てた後、タグ付けの前に
    /// 必ず呼び出す必要があります。
    ///
    /// # エラー
    ///
    /// 辞書の数が [`MAX_DICTIONARIES`] を超える場合、配置できない素性がある場合は
    /// [`WakachiError`] を返します。
    pub fn compile(&mut self) -> Result<()> {
        self.check_dictionaries()?;
        let num_dicts = self.dict_names.len();
        self.boundary_lookup = self
            .boundary_model
            .as_ref()
            .map(|m| FeatureLookup::for_boundaries(m, &self.params, num_dicts))
            .transpose()?;
        self.global_lookups = self
            .global_models
            .iter()
            .map(|g| {
                g.as_ref()
                    .map(|g| FeatureLookup::for_tags(g.model(), &self.params, num_dicts, g.tags().len()))
                    .transpose()
            })
            .collect::<Result<_>>()?;
        log::info!(
            "compiled the model: boundary = {}, global tag models = {}",
            self.boundary_lookup.is_some(),
            self.global_lookups.iter().flatten().count()
        );
        Ok(())
    }

    /// パラメータを返します。
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// タグレベルの数を返します。
    pub fn num_levels(&self) -> usize {
        self.params.num_levels
    }

    /// 辞書名を返します。
    pub fn dict_names(&self) -> &[String] {
        &self.dict_names
    }

    /// 単語辞書を返します。
    pub fn words(&self) -> Option<&PatternDictionary<WordEntry>> {
        self.words.as_ref()
    }

    /// 境界推定の分類器を返します。
    pub fn boundary_model(&self) -> Option<&LinearModel> {
        self.boundary_model.as_ref()
    }

    /// 境界推定の参照表を返します。
    pub fn boundary_lookup(&self) -> Option<&FeatureLookup> {
        self.boundary_lookup.as_ref()
    }

    /// タグレベル `level` の大域分類器を返します。
    pub fn global_model(&self, level: usize) -> Option<&TagModel> {
        self.global_models.get(level).and_then(Option::as_ref)
    }

    /// タグレベル `level` の大域分類器の参照表を返します。
    pub fn global_lookup(&self, level: usize) -> Option<&FeatureLookup> {
        self.global_lookups.get(level).and_then(Option::as_ref)
    }

    /// タグレベル `level` の未知語推定器を返します。
    pub fn unknown(&self, level: usize) -> Option<&UnknownEstimator> {
        self.unknown.get(level).and_then(Option::as_ref)
    }

    /// タグレベル `level` の未知語推定器を差し替えます。
    pub fn set_unknown(&mut self, level: usize, estimator: Option<UnknownEstimator>) {
        if self.unknown.len() <= level {
            self.unknown.resize_with(level + 1, || None);
        }
        self.unknown[level] = estimator;
        self.params.num_levels = self.params.num_levels.max(level + 1);
        self.global_models.resize_with(self.params.num_levels, || None);
        self.global_lookups.resize_with(self.params.num_levels, || None);
        self.unknown.resize_with(self.params.num_levels, || None);
    }

    /// モデルをバイナリ形式で書き出します。
    ///
    /// # 引数
    ///
    /// * `wtr` - 書き込み先
    ///
    /// # エラー
    ///
    /// 書き込みまたはシリアライズに失敗した場合は [`WakachiError`] を返します。
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(MODEL_MAGIC)?;
        wtr.write_all(&[0xFF; PADDING_LEN])?;

        with_arena(|arena: &mut Arena| {
            let writer = IoWriter::new(&mut wtr);
            let mut serializer = Serializer::new(writer, arena.acquire(), Share::new());
            serialize_using::<_, Error>(self, &mut serializer)
        })
        .map_err(|e| {
            WakachiError::invalid_state("rkyv serialization failed".to_string(), e.to_string())
        })?;
        Ok(())
    }

    fn check_magic(magic: &[u8], arg: &'static str) -> Result<()> {
        if !magic.starts_with(MODEL_MAGIC) {
            return Err(WakachiError::invalid_argument(
                arg,
                "The magic number of the input model mismatches.",
            ));
        }
        Ok(())
    }

    fn check_dictionaries(&self) -> Result<()> {
        if self.dict_names.len() > MAX_DICTIONARIES {
            return Err(WakachiError::invalid_state(
                "too many dictionaries",
                format!(
                    "the model names {} dictionaries, but at most {} are supported",
                    self.dict_names.len(),
                    MAX_DICTIONARIES
                ),
            ));
        }
        Ok(())
    }

    fn from_archive(bytes: &[u8]) -> Result<Self> {
        let mut model = from_bytes::<Self, Error>(bytes).map_err(|e| {
            WakachiError::invalid_state(
                "rkyv deserialization failed. The model file may be corrupted.".to_string(),
                e.to_string(),
            )
        })?;
        model.check_dictionaries()?;
        if model.boundary_model.is_some() != model.boundary_lookup.is_some()
            || model.global_lookups.len() != model.global_models.len()
        {
            model.compile()?;
        }
        Ok(model)
    }

    /// バイナリ形式のモデルを読み込みます。
    ///
    /// # 引数
    ///
    /// * `rdr` - 読み込み元
    ///
    /// # エラー
    ///
    /// マジックバイトが一致しない場合、データが壊れている場合は [`WakachiError`] を返します。
    pub fn read<R: Read>(mut rdr: R) -> Result<Self> {
        let mut magic = [0; MODEL_MAGIC_LEN];
        rdr.read_exact(&mut magic)?;
        Self::check_magic(&magic, "rdr")?;

        let mut padding = [0; PADDING_LEN];
        rdr.read_exact(&mut padding)?;

        let mut buffer = Vec::new();
        rdr.read_to_end(&mut buffer)?;
        let mut aligned = AlignedVec::<RKYV_ALIGNMENT>::with_capacity(buffer.len());
        aligned.extend_from_slice(&buffer);
        Self::from_archive(&aligned)
    }

    /// メモリマップを使ってファイルからバイナリ形式のモデルを読み込みます。
    ///
    /// # エラー
    ///
    /// ファイルを開けない場合、マジックバイトが一致しない場合、データが壊れている場合は
    /// [`WakachiError`] を返します。
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            WakachiError::invalid_argument("path", format!("Failed to open model file: {}", e))
        })?;
        // SAFETY: the mapping is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        let Some(magic) = mmap.get(..MODEL_MAGIC_LEN) else {
            return Err(WakachiError::invalid_argument("path", "Model file too small."));
        };
        Self::check_magic(magic, "path")?;
        let Some(data) = mmap.get(DATA_START..) else {
            return Err(WakachiError::invalid_argument(
                "path",
                "Model file too small or corrupted.",
            ));
        };
        Self::from_archive(data)
    }

    /// Zstandard で圧縮されたバイナリ形式のモデルを読み込みます。
    ///
    /// # エラー
    ///
    /// ファイルを開けない場合、展開に失敗した場合、モデルが壊れている場合は
    /// [`WakachiError`] を返します。
    pub fn from_zstd<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            WakachiError::invalid_argument("path", format!("Failed to open model file: {}", e))
        })?;
        let decoder = zstd::Decoder::new(file)?;
        Self::read(decoder)
    }

    /// ファイルの形式を判別してモデルを読み込みます。
    ///
    /// 拡張子が `zst` のファイルは [`from_zstd`](Self::from_zstd)、
    /// テキスト形式のヘッダで始まるファイルは [`read_text`](Self::read_text)、
    /// それ以外は [`from_path`](Self::from_path) で読み込みます。
    ///
    /// # エラー
    ///
    /// いずれかの読み込みに失敗した場合は [`WakachiError`] を返します。
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.extension().is_some_and(|ext| ext == "zst") {
            return Self::from_zstd(path);
        }
        let mut head = Vec::with_capacity(text::TEXT_HEADER.len());
        File::open(path)?
            .take(text::TEXT_HEADER.len() as u64)
            .read_to_end(&mut head)?;
        if head == text::TEXT_HEADER.as_bytes() {
            log::debug!("reading a text model from {}", path.display());
            let file = File::open(path)?;
            return Self::read_text(std::io::BufReader::new(file));
        }
        Self::from_path(path)
    }

    /// モデルをテキスト形式で書き出します。
    ///
    /// # エラー
    ///
    /// 書き込みに失敗した場合は [`WakachiError`] を返します。
    pub fn write_text<W: Write>(&self, wtr: W) -> Result<()> {
        text::write_model(self, wtr)
    }

    /// テキスト形式のモデルを読み込み、参照表を構築します。
    ///
    /// # エラー
    ///
    /// 書式が正しくない場合、参照表を構築できない場合は [`WakachiError`] を返します。
    pub fn read_text<R: BufRead>(rdr: R) -> Result<Self> {
        let mut model = text::read_model(rdr)?;
        model.compile()?;
        Ok(model)
    }
}

/// 部品からモデルを組み立てるビルダー
///
/// # 例
///
/// ```
/// use wakachi::model::{ModelBuilder, ModelParams};
/// use wakachi::model::linear::{LinearModel, SolverKind};
/// use wakachi::TokenString;
///
/// let mut builder = ModelBuilder::new(ModelParams::default());
/// let dict = builder.add_dictionary("system")?;
/// builder.add_word(dict, TokenString::from("これ"), vec![vec![TokenString::from("代名詞")]])?;
/// builder.boundary_model(LinearModel::new(
///     SolverKind::Logistic,
///     vec![1, -1],
///     vec![],
///     vec![-1.0],
/// )?);
/// let model = builder.build()?;
/// assert_eq!(1, model.num_levels());
/// # Ok::<(), wakachi::errors::WakachiError>(())
/// ```
pub struct ModelBuilder {
    params: ModelParams,
    dict_names: Vec<String>,
    words: DictionaryBuilder<WordEntry>,
    boundary_model: Option<LinearModel>,
    global_models: Vec<Option<TagModel>>,
    unknown: Vec<Option<UnknownEstimator>>,
}

impl ModelBuilder {
    /// パラメータを指定してビルダーを作成します。
    pub fn new(params: ModelParams) -> Self {
        Self {
            params,
            dict_names: vec![],
            words: DictionaryBuilder::new(),
            boundary_model: None,
            global_models: vec![],
            unknown: vec![],
        }
    }

    fn touch_level(&mut self, level: usize) {
        self.params.num_levels = self.params.num_levels.max(level + 1);
    }

    /// 辞書を登録し、その番号を返します。
    ///
    /// # エラー
    ///
    /// 既に [`MAX_DICTIONARIES`] 個の辞書が登録されている場合は [`WakachiError`] を返します。
    pub fn add_dictionary<S: Into<String>>(&mut self, name: S) -> Result<usize> {
        if self.dict_names.len() >= MAX_DICTIONARIES {
            return Err(WakachiError::invalid_argument(
                "name",
                format!("at most {} dictionaries can be registered", MAX_DICTIONARIES),
            ));
        }
        self.dict_names.push(name.into());
        Ok(self.dict_names.len() - 1)
    }

    /// 辞書 `dict` に単語を追加します。
    ///
    /// # 引数
    ///
    /// * `dict` - 辞書番号
    /// * `word` - 単語
    /// * `tags` - タグレベルごとのタグ候補
    ///
    /// # エラー
    ///
    /// 辞書番号が登録されていない場合は [`WakachiError`] を返します。
    pub fn add_word(
        &mut self,
        dict: usize,
        word: TokenString,
        tags: Vec<Vec<TokenString>>,
    ) -> Result<()> {
        if dict >= self.dict_names.len() {
            return Err(WakachiError::invalid_argument(
                "dict",
                format!("dictionary {} is not registered", dict),
            ));
        }
        if word.is_empty() {
            return Err(WakachiError::invalid_argument("word", "empty word"));
        }
        if !tags.is_empty() {
            self.touch_level(tags.len() - 1);
        }
        let entry = self
            .words
            .entry_or_insert_with(word.clone(), || WordEntry::new(word));
        entry.set_in_dict(dict)?;
        for (level, tags) in tags.into_iter().enumerate() {
            for tag in tags {
                entry.add_tag(level, tag, dict)?;
            }
        }
        Ok(())
    }

    /// 単語の局所分類器を設定します。分類器のラベルはタグ候補の添字です。
    ///
    /// # エラー
    ///
    /// 単語が追加されていない場合は [`WakachiError`] を返します。
    pub fn tag_model(&mut self, word: &TokenString, level: usize, model: LinearModel) -> Result<()> {
        self.touch_level(level);
        let entry = self.words.get_mut(word).ok_or_else(|| {
            WakachiError::invalid_argument("word", format!("unknown word: {}", word))
        })?;
        entry.set_tag_model(level, model);
        Ok(())
    }

    /// 境界推定の分類器を設定します。
    pub fn boundary_model(&mut self, model: LinearModel) -> &mut Self {
        self.boundary_model = Some(model);
        self
    }

    /// タグレベル `level` の大域分類器を設定します。
    pub fn global_model(&mut self, level: usize, model: TagModel) -> &mut Self {
        self.touch_level(level);
        if self.global_models.len() <= level {
            self.global_models.resize_with(level + 1, || None);
        }
        self.global_models[level] = Some(model);
        self
    }

    /// タグレベル `level` の未知語推定器を設定します。
    pub fn unknown_estimator(&mut self, level: usize, estimator: UnknownEstimator) -> &mut Self {
        self.touch_level(level);
        if self.unknown.len() <= level {
            self.unknown.resize_with(level + 1, || None);
        }
        self.unknown[level] = Some(estimator);
        self
    }

    /// モデルを組み立て、参照表を構築します。
    ///
    /// # エラー
    ///
    /// 参照表を構築できない場合は [`WakachiError`] を返します。
    pub fn build(self) -> Result<Model> {
        let levels = self.params.num_levels;
        let mut global_models = self.global_models;
        global_models.resize_with(levels, || None);
        let mut unknown = self.unknown;
        unknown.resize_with(levels, || None);
        let words = if self.words.is_empty() {
            None
        } else {
            Some(self.words.build()?)
        };
        let mut model = Model {
            params: self.params,
            dict_names: self.dict_names,
            words,
            boundary_model: self.boundary_model,
            boundary_lookup: None,
            global_models,
            global_lookups: vec![],
            unknown,
        };
        model.compile()?;
        Ok(model)
    }
}

/// テキスト形式の読み書きで使う、各部品の組み立て
impl Model {
    pub(crate) fn from_text_parts(
        params: ModelParams,
        dict_names: Vec<String>,
        words: Option<PatternDictionary<WordEntry>>,
        boundary_model: Option<LinearModel>,
        global_models: Vec<Option<TagModel>>,
        unknown: Vec<Option<UnknownEstimator>>,
    ) -> Self {
        Self {
            params,
            dict_names,
            words,
            boundary_model,
            boundary_lookup: None,
            global_models,
            global_lookups: vec![],
            unknown,
        }
    }

    pub(crate) fn global_models(&self) -> &[Option<TagModel>] {
        &self.global_models
    }

    pub(crate) fn unknown_estimators(&self) -> &[Option<UnknownEstimator>] {
        &self.unknown
    }
}
