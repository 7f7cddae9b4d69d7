use crate::system::archive::ArchiveFormat;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use zstd::stream::read::Decoder as ZstdDecoder;

/// 파일 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// 일반 파일 (확장 불가)
    Plain,
    /// 지원되는 아카이브 컨테이너
    Archive(ArchiveFormat),
    /// 관리 코드 모듈 (dex, CLI 어셈블리)
    Managed,
    /// 네이티브 실행 모듈 (ELF, PE)
    Executable,
}

/// Classifies a file cheaply and non-destructively.
///
/// Probe order matters: a managed-module container can coincidentally look
/// like a corrupted archive, so the archive probe (with structural
/// confirmation) runs first and is allowed to fail through. Any probe error
/// or short read degrades to `Plain`; classification never fails, even for
/// zero-byte or truncated input.
pub fn classify(path: &Path) -> FileKind {
    if let Some(format) = probe_archive(path) {
        return FileKind::Archive(format);
    }
    if probe_managed(path) {
        return FileKind::Managed;
    }
    if probe_executable(path) {
        return FileKind::Executable;
    }
    FileKind::Plain
}

/// Magic-byte probe followed by a structural check for the zip family
/// (zip magic alone does not prove the central directory parses).
pub(crate) fn probe_archive(path: &Path) -> Option<ArchiveFormat> {
    let mut file = File::open(path).ok()?;
    let mut magic = [0u8; 6];
    let n = file.read(&mut magic).ok()?;

    if n >= 4 && (magic[..4] == *b"PK\x03\x04" || magic[..4] == *b"PK\x05\x06") {
        file.seek(SeekFrom::Start(0)).ok()?;
        zip::ZipArchive::new(file).ok()?;
        return Some(zip_family(path));
    }
    // gzip/zstd는 압축기이지 컨테이너가 아니다. 압축 뒤에 그럴듯한 tar
    // 헤더가 있어야 아카이브로 본다.
    if n >= 2 && magic[..2] == [0x1f, 0x8b] {
        file.seek(SeekFrom::Start(0)).ok()?;
        return tar_stream_confirms(GzDecoder::new(file)).then_some(ArchiveFormat::TarGz);
    }
    if n >= 4 && magic[..4] == [0x28, 0xb5, 0x2f, 0xfd] {
        file.seek(SeekFrom::Start(0)).ok()?;
        let decoder = ZstdDecoder::new(file).ok()?;
        return tar_stream_confirms(decoder).then_some(ArchiveFormat::TarZst);
    }
    if n >= 6 && magic[..6] == [0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c] {
        return Some(ArchiveFormat::SevenZ);
    }

    // Plain tar has no leading magic; "ustar" sits at offset 257.
    let mut ustar = [0u8; 5];
    file.seek(SeekFrom::Start(257)).ok()?;
    if file.read(&mut ustar).ok()? == 5 && &ustar == b"ustar" {
        return Some(ArchiveFormat::Tar);
    }
    None
}

/// Reads the first 512-byte block through the decoder and checks it is a
/// plausible tar header: either the all-zero block of an empty archive or a
/// block whose stored octal checksum matches.
fn tar_stream_confirms<R: Read>(mut reader: R) -> bool {
    let mut block = [0u8; 512];
    if reader.read_exact(&mut block).is_err() {
        return false;
    }
    if block.iter().all(|&b| b == 0) {
        return true;
    }
    tar_checksum_matches(&block)
}

/// 체크섬은 필드 자신을 공백으로 친 헤더 바이트 합 (8진수 저장).
fn tar_checksum_matches(block: &[u8; 512]) -> bool {
    let field = &block[148..156];
    let text: String = field
        .iter()
        .map(|&b| b as char)
        .filter(|c| c.is_digit(8))
        .collect();
    let Ok(stored) = u32::from_str_radix(&text, 8) else {
        return false;
    };
    let sum: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u32 } else { b as u32 })
        .sum();
    sum == stored
}

/// zip 계열은 확장자로 세분한다 (jar/war/apk는 모두 zip 컨테이너).
fn zip_family(path: &Path) -> ArchiveFormat {
    match crate::system::archive::detect_archive_format(path) {
        Some(
            format @ (ArchiveFormat::Jar | ArchiveFormat::War | ArchiveFormat::Apk),
        ) => format,
        _ => ArchiveFormat::Zip,
    }
}

fn probe_managed(path: &Path) -> bool {
    if path
        .extension()
        .and_then(|v| v.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dex"))
    {
        return true;
    }
    let Some(head) = read_head(path) else {
        return false;
    };
    if head.len() >= 4 && head[..4] == *b"dex\n" {
        return true;
    }
    if head.len() >= 2 && head[..2] == *b"MZ" {
        return pe_has_clr(&head).unwrap_or(false);
    }
    false
}

fn probe_executable(path: &Path) -> bool {
    let Some(head) = read_head(path) else {
        return false;
    };
    if head.len() >= 4 && head[..4] == [0x7f, b'E', b'L', b'F'] {
        return true;
    }
    if head.len() >= 2 && head[..2] == *b"MZ" {
        return pe_signature_offset(&head).is_some();
    }
    false
}

/// 헤더 프로브용으로 파일 앞부분만 읽는다.
fn read_head(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut head = Vec::new();
    file.take(4096).read_to_end(&mut head).ok()?;
    Some(head)
}

fn pe_signature_offset(head: &[u8]) -> Option<usize> {
    // e_lfanew at 0x3C points at the "PE\0\0" signature.
    let pe_off = u32_at(head, 0x3c)? as usize;
    if head.get(pe_off..pe_off + 4)? == b"PE\0\0" {
        Some(pe_off)
    } else {
        None
    }
}

/// A PE is a managed (CLI) module when data directory #14, the CLR runtime
/// header, is non-empty. PE32 keeps the directory count at optional-header
/// offset 92, PE32+ at 108; the directory table follows immediately.
fn pe_has_clr(head: &[u8]) -> Option<bool> {
    let pe_off = pe_signature_offset(head)?;
    let opt = pe_off + 24;
    let magic = u16_at(head, opt)?;
    let num_rva_off = if magic == 0x20b { opt + 108 } else { opt + 92 };
    let num_rva = u32_at(head, num_rva_off)? as usize;
    if num_rva <= 14 {
        return Some(false);
    }
    let clr = num_rva_off + 4 + 14 * 8;
    Some(u32_at(head, clr)? != 0)
}

fn u16_at(buf: &[u8], off: usize) -> Option<u16> {
    let bytes = buf.get(off..off + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_at(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
